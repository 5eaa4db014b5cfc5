use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use stockledger_core::{CustomerId, DomainError, DomainResult};

/// Input for registering a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub preferences: Vec<String>,
}

/// A store customer.
///
/// Purchases are not kept here; they are the sale ledger entries that reference
/// the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    id: CustomerId,
    name: String,
    email: String,
    preferences: BTreeSet<String>,
}

impl Customer {
    pub fn register(id: CustomerId, new: NewCustomer) -> DomainResult<Self> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        let email = new.email.trim().to_lowercase();
        if !is_plausible_email(&email) {
            return Err(DomainError::validation(format!("invalid email '{email}'")));
        }

        Ok(Self {
            id,
            name: name.to_string(),
            email,
            preferences: new
                .preferences
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        })
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn preferences(&self) -> &BTreeSet<String> {
        &self.preferences
    }

    pub fn prefers(&self, preference: &str) -> bool {
        self.preferences.contains(preference)
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    }
}
