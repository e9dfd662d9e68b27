/// `1 change`, `2 changes`
pub fn pluralize(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{} {}", count, noun)
    } else {
        format!("{} {}s", count, noun)
    }
}

/// Label for the pending-changes indicator. `None` when nothing is pending.
pub fn pending_label(pending: usize, syncing: bool, online: bool) -> Option<String> {
    if pending == 0 {
        return None;
    }

    let changes = pluralize(pending, "change");
    Some(if syncing {
        format!("Syncing {}...", changes)
    } else if online {
        format!("{} pending", changes)
    } else {
        format!("{} pending (offline)", changes)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize(0, "change"), "0 changes");
        assert_eq!(pluralize(1, "change"), "1 change");
        assert_eq!(pluralize(12, "change"), "12 changes");
    }

    #[test]
    fn test_pending_label() {
        assert_eq!(pending_label(0, false, false), None);
        assert_eq!(pending_label(2, true, true).as_deref(), Some("Syncing 2 changes..."));
        assert_eq!(
            pending_label(3, false, false).as_deref(),
            Some("3 changes pending (offline)")
        );
        assert_eq!(pending_label(1, false, true).as_deref(), Some("1 change pending"));
    }
}
