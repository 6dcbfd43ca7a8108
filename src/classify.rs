//! Violation classification.
//!
//! `classify` maps one normalized event to at most one Violation under the
//! session policy. It is pure: no state, no side effects. Default-action
//! suppression has already happened in the adapter by the time an event
//! gets here.

use chrono::{DateTime, Utc};

use crate::signal::{EventCategory, KeyCombo, RawEvent};
use crate::{Policy, Violation, ViolationKind};

/// A restricted key combination. Modifier sets must match exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShortcutRule {
    pub key: &'static str,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

impl ShortcutRule {
    const fn ctrl(key: &'static str) -> Self {
        Self {
            key,
            ctrl: true,
            alt: false,
            shift: false,
        }
    }

    pub fn matches(&self, combo: &KeyCombo) -> bool {
        combo.key.eq_ignore_ascii_case(self.key)
            && combo.ctrl == self.ctrl
            && combo.alt == self.alt
            && combo.shift == self.shift
    }
}

pub const RESTRICTED_SHORTCUTS: [ShortcutRule; 7] = [
    ShortcutRule::ctrl("c"),
    ShortcutRule::ctrl("v"),
    ShortcutRule::ctrl("a"),
    ShortcutRule::ctrl("t"),
    ShortcutRule {
        key: "Tab",
        ctrl: false,
        alt: true,
        shift: false,
    },
    ShortcutRule {
        key: "F12",
        ctrl: false,
        alt: false,
        shift: false,
    },
    ShortcutRule {
        key: "i",
        ctrl: true,
        alt: false,
        shift: true,
    },
];

pub fn is_restricted_shortcut(combo: &KeyCombo) -> bool {
    RESTRICTED_SHORTCUTS.iter().any(|rule| rule.matches(combo))
}

pub fn classify(event: &RawEvent, policy: &Policy) -> Option<Violation> {
    match &event.category {
        EventCategory::VisibilityChanged { hidden: true } if !policy.allow_tab_switch => {
            Some(Violation::new(
                ViolationKind::TabSwitch,
                event.time,
                "Tab switch or window change detected".to_string(),
            ))
        }
        EventCategory::VisibilityChanged { .. } => None,
        EventCategory::KeyPressed(combo) if is_restricted_shortcut(combo) => Some(Violation::new(
            ViolationKind::DisallowedShortcut,
            event.time,
            format!("Attempted restricted shortcut {}", combo),
        )),
        EventCategory::KeyPressed(_) => None,
        EventCategory::ContextMenuRequested => Some(Violation::new(
            ViolationKind::ContextMenu,
            event.time,
            "Context menu requested".to_string(),
        )),
        // Handled as a confirmation prompt, never logged.
        EventCategory::BeforeUnloadRequested => None,
        EventCategory::FullscreenChanged { .. } => None,
    }
}

/// Violation for an in-app navigation away from the session that the host
/// router intercepted.
pub fn navigation_violation(target: &str, at: DateTime<Utc>) -> Violation {
    let target = target.trim();
    let detail = if target.is_empty() {
        "Navigation away from the test was blocked".to_string()
    } else {
        format!("Navigation away from the test was blocked: {}", target)
    };
    Violation::new(ViolationKind::NavigationAttempt, at, detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(category: EventCategory) -> RawEvent {
        RawEvent {
            category,
            time: Utc::now(),
        }
    }

    fn strict() -> Policy {
        Policy::new("Physics Final").unwrap()
    }

    #[test]
    fn hidden_visibility_is_tab_switch_unless_allowed() {
        let hidden = event(EventCategory::VisibilityChanged { hidden: true });
        let v = classify(&hidden, &strict()).expect("violation");
        assert_eq!(v.kind(), ViolationKind::TabSwitch);
        assert_eq!(v.timestamp(), hidden.time);

        let lenient = strict().with_tab_switch_allowed(true);
        assert!(classify(&hidden, &lenient).is_none());

        let visible = event(EventCategory::VisibilityChanged { hidden: false });
        assert!(classify(&visible, &strict()).is_none());
    }

    #[test]
    fn every_restricted_shortcut_is_flagged() {
        let combos = [
            KeyCombo::new("c").ctrl(),
            KeyCombo::new("V").ctrl(),
            KeyCombo::new("a").ctrl(),
            KeyCombo::new("t").ctrl(),
            KeyCombo::new("Tab").alt(),
            KeyCombo::new("F12"),
            KeyCombo::new("I").ctrl().shift(),
        ];
        for combo in combos {
            let v = classify(&event(EventCategory::KeyPressed(combo.clone())), &strict())
                .unwrap_or_else(|| panic!("{} should be restricted", combo));
            assert_eq!(v.kind(), ViolationKind::DisallowedShortcut);
            assert!(v.detail().contains(&combo.to_string()));
        }
    }

    #[test]
    fn shortcut_match_is_exact() {
        let near_misses = [
            KeyCombo::new("c"),
            KeyCombo::new("c").ctrl().shift(),
            KeyCombo::new("c").ctrl().alt(),
            KeyCombo::new("i").ctrl(),
            KeyCombo::new("Tab"),
            KeyCombo::new("Tab").alt().shift(),
            KeyCombo::new("F12").ctrl(),
            KeyCombo::new("F1"),
            KeyCombo::new("x").ctrl(),
        ];
        for combo in near_misses {
            assert!(
                classify(&event(EventCategory::KeyPressed(combo.clone())), &strict()).is_none(),
                "{} should not match",
                combo
            );
        }
    }

    #[test]
    fn context_menu_ignores_policy() {
        let lenient = strict().with_tab_switch_allowed(true).with_warnings(false);
        let v = classify(&event(EventCategory::ContextMenuRequested), &lenient).unwrap();
        assert_eq!(v.kind(), ViolationKind::ContextMenu);
    }

    #[test]
    fn unload_and_fullscreen_never_produce_violations() {
        assert!(classify(&event(EventCategory::BeforeUnloadRequested), &strict()).is_none());
        assert!(classify(
            &event(EventCategory::FullscreenChanged {
                is_fullscreen: false
            }),
            &strict()
        )
        .is_none());
    }

    #[test]
    fn navigation_violation_carries_target() {
        let v = navigation_violation(" /dashboard ", Utc::now());
        assert_eq!(v.kind(), ViolationKind::NavigationAttempt);
        assert!(v.detail().ends_with("/dashboard"));
        assert_eq!(
            navigation_violation("", Utc::now()).detail(),
            "Navigation away from the test was blocked"
        );
    }
}
