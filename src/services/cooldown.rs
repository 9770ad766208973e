use chrono::{DateTime, Duration, Local};

/// Per-detector dedup state: when the gate last let a signal through and
/// which key it carried.
///
/// A gate belongs to exactly one detector and is never shared.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    window: Option<Duration>,
    key_sensitive: bool,
    last_fired_at: Option<DateTime<Local>>,
    last_key: Option<String>,
}

impl CooldownGate {
    /// Fires at most once per `window`, whatever the key.
    pub fn global(window: Duration) -> Self {
        Self {
            window: Some(window),
            key_sensitive: false,
            last_fired_at: None,
            last_key: None,
        }
    }

    /// Fires when `window` has elapsed or immediately when the key changes.
    pub fn keyed(window: Duration) -> Self {
        Self {
            window: Some(window),
            key_sensitive: true,
            last_fired_at: None,
            last_key: None,
        }
    }

    /// Fires only when the key changes.
    pub fn on_change() -> Self {
        Self {
            window: None,
            key_sensitive: true,
            last_fired_at: None,
            last_key: None,
        }
    }

    pub fn should_fire(&mut self, key: &str, now: DateTime<Local>) -> bool {
        let fire = match self.last_fired_at {
            None => true,
            Some(last) => {
                let key_changed = self.key_sensitive && self.last_key.as_deref() != Some(key);
                let expired = self.window.is_some_and(|window| now - last > window);
                key_changed || expired
            }
        };

        if fire {
            self.last_fired_at = Some(now);
            self.last_key = Some(key.to_string());
        }
        fire
    }

    pub fn last_key(&self) -> Option<&str> {
        self.last_key.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn global_gate_ignores_key() {
        let mut gate = CooldownGate::global(Duration::seconds(5));
        assert!(gate.should_fire("a", t(0)));
        assert!(!gate.should_fire("b", t(2)));
        assert!(!gate.should_fire("a", t(5)));
        assert!(gate.should_fire("a", t(6)));
    }

    #[test]
    fn keyed_gate_fires_on_key_change() {
        let mut gate = CooldownGate::keyed(Duration::seconds(5));
        assert!(gate.should_fire("Example", t(0)));
        assert!(!gate.should_fire("Example", t(3)));
        assert!(gate.should_fire("Other", t(4)));
        assert!(!gate.should_fire("Other", t(9)));
        assert!(gate.should_fire("Other", t(10)));
        assert_eq!(gate.last_key(), Some("Other"));
    }

    #[test]
    fn change_gate_never_expires() {
        let mut gate = CooldownGate::on_change();
        assert!(gate.should_fire("code", t(0)));
        assert!(!gate.should_fire("code", t(3600)));
        assert!(gate.should_fire("chrome.exe", t(3601)));
        assert!(gate.should_fire("code", t(3602)));
    }

    #[test]
    fn suppressed_signal_does_not_extend_window() {
        let mut gate = CooldownGate::global(Duration::seconds(3));
        assert!(gate.should_fire("", t(0)));
        assert!(!gate.should_fire("", t(2)));
        assert!(gate.should_fire("", t(4)));
    }
}
