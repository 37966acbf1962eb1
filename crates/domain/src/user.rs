//! Users, roles and student cluster assignments.

use serde::{Deserialize, Serialize};

use crate::identifiers::UserId;

/// Roles notified by the inventory sweeps
pub const INVENTORY_AUDIENCE_ROLES: [&str; 3] = ["admin", "gerente", "encargado_inventario"];

/// A platform user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub roles: Vec<String>,
}

impl User {
    /// Whether the user holds any of `roles`
    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        self.roles
            .iter()
            .any(|held| roles.iter().any(|wanted| held == wanted.as_ref()))
    }
}

/// Cluster a student was assigned to by the clustering service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub student_id: UserId,
    pub cluster_id: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_any_role() {
        let user = User {
            id: UserId::new(1),
            name: "Ana".to_string(),
            email: "ana@colegio.edu".to_string(),
            roles: vec!["profesor".to_string(), "gerente".to_string()],
        };
        assert!(user.has_any_role(&INVENTORY_AUDIENCE_ROLES));
        assert!(!user.has_any_role(&["admin"]));
    }
}
