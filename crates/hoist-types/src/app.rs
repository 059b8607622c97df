use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Collaborators of an app, keyed by email.
pub type CollaboratorMap = BTreeMap<String, Collaborator>;

/// Role a collaborator holds on an app.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// Exactly one collaborator per app holds this.
    Owner,
    Collaborator,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner => write!(f, "Owner"),
            Self::Collaborator => write!(f, "Collaborator"),
        }
    }
}

/// One entry of an app's collaborator map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub account_id: String,
    pub permission: Permission,
    /// Set on read for the collaborator matching the requesting account.
    /// Never persisted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_current_account: bool,
}

impl Collaborator {
    pub fn new(account_id: impl Into<String>, permission: Permission) -> Self {
        Self {
            account_id: account_id.into(),
            permission,
            is_current_account: false,
        }
    }

    pub fn owner(account_id: impl Into<String>) -> Self {
        Self::new(account_id, Permission::Owner)
    }
}

/// An application and the accounts allowed to manage it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    /// Assigned by the storage layer on creation; ignored on input.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub collaborators: CollaboratorMap,
    pub created_time: i64,
}

impl App {
    pub fn new(name: impl Into<String>, created_time: i64) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            collaborators: CollaboratorMap::new(),
            created_time,
        }
    }

    /// Email of the collaborator holding [`Permission::Owner`].
    pub fn owner_email(&self) -> Option<&str> {
        self.collaborators
            .iter()
            .find(|(_, c)| c.permission == Permission::Owner)
            .map(|(email, _)| email.as_str())
    }

    pub fn is_owner(&self, email: &str) -> bool {
        self.collaborators
            .get(email)
            .is_some_and(|c| c.permission == Permission::Owner)
    }

    /// The map key under which `email` is a collaborator, ignoring case.
    pub fn collaborator_email(&self, email: &str) -> Option<&str> {
        let wanted = email.to_lowercase();
        self.collaborators
            .keys()
            .find(|key| key.to_lowercase() == wanted)
            .map(String::as_str)
    }

    /// Email under which `account_id` appears in the collaborator map.
    pub fn email_for_account(&self, account_id: &str) -> Option<&str> {
        self.collaborators
            .iter()
            .find(|(_, c)| c.account_id == account_id)
            .map(|(email, _)| email.as_str())
    }

    /// Recompute `is_current_account` for the given requester.
    pub fn mark_current_account(&mut self, account_id: &str) {
        for collaborator in self.collaborators.values_mut() {
            collaborator.is_current_account = collaborator.account_id == account_id;
        }
    }

    /// Drop every per-viewer flag so the map can be persisted.
    pub fn clear_current_account(&mut self) {
        for collaborator in self.collaborators.values_mut() {
            collaborator.is_current_account = false;
        }
    }

    /// Make `email` the sole owner, demoting whoever held ownership before.
    ///
    /// If `email` is not yet a collaborator it is added with `account_id`.
    /// Returns `true` when a new collaborator entry was created.
    pub fn transfer_ownership(&mut self, email: &str, account_id: &str) -> bool {
        for collaborator in self.collaborators.values_mut() {
            if collaborator.permission == Permission::Owner {
                collaborator.permission = Permission::Collaborator;
            }
        }
        match self.collaborators.get_mut(email) {
            Some(existing) => {
                existing.permission = Permission::Owner;
                false
            }
            None => {
                self.collaborators
                    .insert(email.to_string(), Collaborator::owner(account_id));
                true
            }
        }
    }

    /// Number of collaborators holding [`Permission::Owner`].
    pub fn owner_count(&self) -> usize {
        self.collaborators
            .values()
            .filter(|c| c.permission == Permission::Owner)
            .count()
    }
}
