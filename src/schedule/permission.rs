use serde::{Deserialize, Serialize};

use super::model::WorkerId;

/// Role flags resolved by the host for the whole session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionContext {
    pub can_edit_all: bool,
    pub can_edit_self: bool,
    pub acting_worker_id: WorkerId,
}

impl PermissionContext {
    pub fn read_only(acting_worker_id: WorkerId) -> Self {
        Self {
            can_edit_all: false,
            can_edit_self: false,
            acting_worker_id,
        }
    }

    pub fn can_edit(&self, worker_id: WorkerId) -> bool {
        self.can_edit_all || (self.can_edit_self && worker_id == self.acting_worker_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_all() {
        let ctx = PermissionContext {
            can_edit_all: true,
            can_edit_self: false,
            acting_worker_id: 1,
        };
        assert!(ctx.can_edit(1));
        assert!(ctx.can_edit(2));
    }

    #[test]
    fn test_edit_self_only() {
        let ctx = PermissionContext {
            can_edit_all: false,
            can_edit_self: true,
            acting_worker_id: 7,
        };
        assert!(ctx.can_edit(7));
        assert!(!ctx.can_edit(8));
    }

    #[test]
    fn test_no_rights() {
        let ctx = PermissionContext::read_only(7);
        assert!(!ctx.can_edit(7));
        assert!(!ctx.can_edit(1));
    }
}
