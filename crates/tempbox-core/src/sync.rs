//! Mail list reconciliation.
//!
//! Merges a freshly fetched snapshot of an address's mail into the locally
//! held list. Local order is authoritative for mail already seen; unseen
//! mail is appended in the order the remote supplied it. Nothing is ever
//! removed or moved, so applying the same snapshot twice is a no-op and
//! snapshots that complete out of order cannot erase each other's mail.

use std::collections::HashSet;

use crate::model::{Mail, MailId};

/// Result of merging one snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Number of mails appended to the local list.
    pub appended: usize,
}

impl MergeOutcome {
    /// Returns `true` if the merge changed the local list.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.appended > 0
    }
}

/// Merge `incoming` into `local`.
///
/// Mail whose id is already known is skipped, including duplicates inside
/// `incoming` itself.
pub fn merge_mails(local: &mut Vec<Mail>, incoming: &[Mail]) -> MergeOutcome {
    let mut known: HashSet<MailId> = local.iter().map(|m| m.id.clone()).collect();
    let before = local.len();

    for mail in incoming {
        if known.insert(mail.id.clone()) {
            local.push(mail.clone());
        }
    }

    MergeOutcome {
        appended: local.len() - before,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::needless_collect)]
mod tests {
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    use super::*;

    fn mail(id: &str) -> Mail {
        Mail::new(id, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    fn ids(mails: &[Mail]) -> Vec<&str> {
        mails.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn appends_unseen_mail() {
        let mut local = vec![mail("m1")];
        let outcome = merge_mails(&mut local, &[mail("m1"), mail("m2")]);
        assert_eq!(outcome.appended, 1);
        assert!(outcome.changed());
        assert_eq!(ids(&local), ["m1", "m2"]);
    }

    #[test]
    fn reordered_snapshot_keeps_local_order() {
        let mut local = vec![mail("m1"), mail("m2")];
        let outcome = merge_mails(&mut local, &[mail("m2"), mail("m1")]);
        assert!(!outcome.changed());
        assert_eq!(ids(&local), ["m1", "m2"]);
    }

    #[test]
    fn new_mail_goes_after_existing_even_if_remote_lists_it_first() {
        let mut local = vec![mail("m1")];
        merge_mails(&mut local, &[mail("m0"), mail("m1")]);
        assert_eq!(ids(&local), ["m1", "m0"]);
    }

    #[test]
    fn duplicates_within_snapshot_are_collapsed() {
        let mut local = Vec::new();
        let outcome = merge_mails(&mut local, &[mail("m1"), mail("m1"), mail("m2")]);
        assert_eq!(outcome.appended, 2);
        assert_eq!(ids(&local), ["m1", "m2"]);
    }

    #[test]
    fn older_snapshot_completing_late_erases_nothing() {
        let mut local = Vec::new();
        merge_mails(&mut local, &[mail("m1"), mail("m2"), mail("m3")]);
        let outcome = merge_mails(&mut local, &[mail("m1")]);
        assert!(!outcome.changed());
        assert_eq!(ids(&local), ["m1", "m2", "m3"]);
    }

    #[test]
    fn empty_snapshot_is_noop() {
        let mut local = vec![mail("m1")];
        assert_eq!(merge_mails(&mut local, &[]), MergeOutcome::default());
        assert_eq!(local.len(), 1);
    }

    fn snapshot_strategy() -> impl Strategy<Value = Vec<Mail>> {
        prop::collection::vec(0u8..20, 0..15)
            .prop_map(|ids| ids.into_iter().map(|i| mail(&format!("m{i}"))).collect())
    }

    proptest! {
        /// Applying the same snapshot twice changes nothing the second time.
        #[test]
        fn merge_is_idempotent(local in snapshot_strategy(), incoming in snapshot_strategy()) {
            let mut once = Vec::new();
            merge_mails(&mut once, &local);
            merge_mails(&mut once, &incoming);
            let mut twice = once.clone();
            let outcome = merge_mails(&mut twice, &incoming);
            prop_assert_eq!(outcome.appended, 0);
            prop_assert_eq!(once, twice);
        }

        /// Every id present before a merge is present after it, in the same
        /// relative order, as a prefix of the result.
        #[test]
        fn merge_is_append_only(local in snapshot_strategy(), incoming in snapshot_strategy()) {
            let mut list = Vec::new();
            merge_mails(&mut list, &local);
            let before = list.clone();
            merge_mails(&mut list, &incoming);
            prop_assert!(list.len() >= before.len());
            prop_assert_eq!(&list[..before.len()], &before[..]);
        }

        /// The merged list never holds the same id twice.
        #[test]
        fn merge_never_duplicates(local in snapshot_strategy(), incoming in snapshot_strategy()) {
            let mut list = Vec::new();
            merge_mails(&mut list, &local);
            merge_mails(&mut list, &incoming);
            let unique: HashSet<_> = list.iter().map(|m| m.id.clone()).collect();
            prop_assert_eq!(unique.len(), list.len());
        }
    }
}
