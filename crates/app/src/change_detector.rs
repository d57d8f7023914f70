//! Classify one remote file against its local copy.

use switch_sync_domain::{FileTimestamp, SyncOutcome};

/// Decide what to do with a remote file.
///
/// The comparison is strict: a local copy stamped with the same or a later
/// time is current, so re-running a pass against an unchanged server never
/// downloads anything.
#[must_use]
pub fn decide(remote: Option<FileTimestamp>, local: Option<FileTimestamp>) -> SyncOutcome {
    let Some(remote) = remote else {
        return SyncOutcome::failed("remote modification time unavailable");
    };
    match local {
        None => SyncOutcome::New,
        Some(local) if remote > local => SyncOutcome::Updated,
        Some(_) => SyncOutcome::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const fn ts(seconds: i64) -> FileTimestamp {
        FileTimestamp::from_unix_seconds(seconds)
    }

    #[test]
    fn missing_local_copy_is_new() {
        assert_eq!(decide(Some(ts(100)), None), SyncOutcome::New);
    }

    #[test]
    fn strictly_newer_remote_is_updated() {
        assert_eq!(decide(Some(ts(101)), Some(ts(100))), SyncOutcome::Updated);
    }

    #[test]
    fn equal_or_older_remote_is_unchanged() {
        assert_eq!(decide(Some(ts(100)), Some(ts(100))), SyncOutcome::Unchanged);
        assert_eq!(decide(Some(ts(99)), Some(ts(100))), SyncOutcome::Unchanged);
    }

    #[test]
    fn unknown_remote_time_fails_the_file() {
        assert!(matches!(decide(None, None), SyncOutcome::Failed { .. }));
        assert!(matches!(decide(None, Some(ts(1))), SyncOutcome::Failed { .. }));
    }

    proptest! {
        #[test]
        fn only_strictly_newer_remote_copies_are_fetched(remote in 0_i64..4_000_000_000, local in 0_i64..4_000_000_000) {
            let outcome = decide(Some(ts(remote)), Some(ts(local)));
            prop_assert_eq!(outcome.change().is_some(), remote > local);
        }
    }
}
