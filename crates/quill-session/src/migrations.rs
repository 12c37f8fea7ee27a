//! One-shot settings migrations.
//!
//! Run on every load; each migration is guarded by the presence of the
//! field it produces, so it fires at most once and re-running on an
//! already-migrated record changes nothing.

use crate::schema::Settings;

/// Migrate legacy settings fields into their current counterparts.
/// Returns `true` if anything changed.
pub fn migrate_settings(settings: &mut Settings) -> bool {
    let mut changed = false;

    // Legacy single background -> per-theme background map.
    if let Some(background) = settings.background.clone() {
        if settings.backgrounds.is_empty() {
            let theme = settings.active_theme();
            tracing::info!(theme = %theme, "migrating legacy background");
            settings.backgrounds.insert(theme, background);
            changed = true;
        }
    }

    // Legacy boolean night flag -> theme name.
    if settings.theme.is_none() {
        if let Some(night) = settings.night_mode {
            let theme = if night { "night" } else { "day" };
            tracing::info!(theme, "migrating legacy night flag");
            settings.theme = Some(theme.to_string());
            changed = true;
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Background;

    #[test]
    fn legacy_background_projected_onto_theme() {
        let mut settings = Settings {
            background: Some(Background {
                slug: "mountains".into(),
                blur: true,
                color: None,
            }),
            night_mode: Some(true),
            ..Default::default()
        };

        assert!(migrate_settings(&mut settings));
        assert_eq!(settings.backgrounds["night"].slug, "mountains");
        assert_eq!(settings.theme.as_deref(), Some("night"));
    }

    #[test]
    fn legacy_night_flag_derives_theme() {
        let mut settings = Settings {
            night_mode: Some(false),
            ..Default::default()
        };

        assert!(migrate_settings(&mut settings));
        assert_eq!(settings.theme.as_deref(), Some("day"));
    }

    #[test]
    fn migrations_are_idempotent() {
        let mut settings = Settings {
            background: Some(Background::default()),
            night_mode: Some(true),
            ..Default::default()
        };

        assert!(migrate_settings(&mut settings));
        let migrated = settings.clone();

        // Second run on an already-migrated record is a no-op.
        assert!(!migrate_settings(&mut settings));
        assert_eq!(settings, migrated);
    }

    #[test]
    fn untouched_settings_stay_untouched() {
        let mut settings = Settings::default();
        assert!(!migrate_settings(&mut settings));
        assert_eq!(settings, Settings::default());
    }
}
