use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{IdentityLookup, ReviewerIdentity, UserId};
use crate::storage::Repository;

/// Resolves reviewer IDs to display identities.
///
/// IDs the directory doesn't know are left out of the returned map rather
/// than reported as errors. An `Err` means the whole lookup failed.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup_many(&self, ids: &[UserId]) -> Result<HashMap<UserId, ReviewerIdentity>>;
}

#[async_trait]
impl UserDirectory for Repository {
    async fn lookup_many(&self, ids: &[UserId]) -> Result<HashMap<UserId, ReviewerIdentity>> {
        let users = self.get_users(ids).await?;
        Ok(users
            .iter()
            .map(|user| (user.id, ReviewerIdentity::from(user)))
            .collect())
    }
}

/// Turn a batch lookup into one tagged result per requested ID.
pub fn tag_lookups(
    ids: &[UserId],
    found: &HashMap<UserId, ReviewerIdentity>,
) -> HashMap<UserId, IdentityLookup> {
    ids.iter()
        .map(|id| {
            let lookup = match found.get(id) {
                Some(identity) => IdentityLookup::Resolved(identity.clone()),
                None => IdentityLookup::Missing,
            };
            (*id, lookup)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_unknown_ids_are_missing() {
        let known = Uuid::new_v4();
        let unknown = Uuid::new_v4();
        let mut found = HashMap::new();
        found.insert(
            known,
            ReviewerIdentity {
                display_name: "Kim".into(),
                avatar: None,
            },
        );

        let tagged = tag_lookups(&[known, unknown], &found);

        assert!(matches!(tagged[&known], IdentityLookup::Resolved(ref id) if id.display_name == "Kim"));
        assert_eq!(tagged[&unknown], IdentityLookup::Missing);
    }
}
