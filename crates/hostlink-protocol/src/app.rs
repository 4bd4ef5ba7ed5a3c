use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::xml::XmlResponse;

/// One launchable application/game as reported by a host's `/applist`, plus
/// client-only annotations that must survive server-authoritative refreshes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: i32,
    pub guid: String,
    pub name: String,
    pub game_platform: String,
    pub hdr_supported: bool,
    pub is_app_collector_game: bool,

    // Client-only: never sent by the host, preserved across merges by id.
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub direct_launch: bool,
    #[serde(default)]
    pub last_app_start_time: i64,
    #[serde(default)]
    pub box_art: String,
}

impl Application {
    /// Copy this application's client-only fields onto `incoming`, which was
    /// just parsed fresh from the host and so has none of them set.
    fn carry_client_only_fields_into(&self, incoming: &mut Application) {
        incoming.hidden = self.hidden;
        incoming.direct_launch = self.direct_launch;
        incoming.last_app_start_time = self.last_app_start_time;
        incoming.box_art = self.box_art.clone();
    }
}

/// Merge a freshly-fetched app list into the existing one, preserving
/// client-only fields (`hidden`, `directLaunch`, `lastAppStartTime`,
/// `boxArt`) for apps that already existed, keyed by `id`.
pub fn merge_app_lists(existing: &[Application], incoming: Vec<Application>) -> Vec<Application> {
    let existing_by_id: HashMap<i32, &Application> =
        existing.iter().map(|a| (a.id, a)).collect();

    incoming
        .into_iter()
        .map(|mut app| {
            if let Some(prior) = existing_by_id.get(&app.id) {
                prior.carry_client_only_fields_into(&mut app);
            }
            app
        })
        .collect()
}

/// Parse the repeated `<App>` sections of an `/applist` response
/// (§6). Apps with an unparseable `id` are skipped rather than
/// defaulting to `0`, since `0` would collide as a map key in
/// [`merge_app_lists`].
pub fn parse_app_list(resp: &XmlResponse) -> Vec<Application> {
    let Some(sections) = resp.repeated.get("App") else {
        return Vec::new();
    };

    sections
        .iter()
        .filter_map(|fields| {
            let id: i32 = fields.get("ID")?.trim().parse().ok()?;
            Some(Application {
                id,
                guid: fields.get("AppTitleId").cloned().unwrap_or_default(),
                name: fields.get("AppTitle").cloned().unwrap_or_default(),
                game_platform: fields.get("GamePlatform").cloned().unwrap_or_default(),
                hdr_supported: fields.get("IsHdrSupported").map(|v| v == "1").unwrap_or(false),
                is_app_collector_game: fields
                    .get("IsAppCollectorGame")
                    .map(|v| v == "1")
                    .unwrap_or(false),
                hidden: false,
                direct_launch: false,
                last_app_start_time: 0,
                box_art: String::new(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(id: i32, name: &str) -> Application {
        Application {
            id,
            guid: format!("guid-{id}"),
            name: name.to_string(),
            game_platform: "steam".to_string(),
            hdr_supported: false,
            is_app_collector_game: false,
            hidden: false,
            direct_launch: false,
            last_app_start_time: 0,
            box_art: String::new(),
        }
    }

    #[test]
    fn merge_preserves_client_only_fields_by_id() {
        let mut existing = app(1, "Old Name");
        existing.hidden = true;
        existing.direct_launch = true;
        existing.last_app_start_time = 12345;
        existing.box_art = "cached.png".to_string();

        let incoming = vec![app(1, "New Name")];
        let merged = merge_app_lists(&[existing], incoming);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "New Name");
        assert!(merged[0].hidden);
        assert!(merged[0].direct_launch);
        assert_eq!(merged[0].last_app_start_time, 12345);
        assert_eq!(merged[0].box_art, "cached.png");
    }

    #[test]
    fn merge_drops_apps_absent_from_incoming() {
        let existing = app(1, "Gone Tomorrow");
        let incoming = vec![app(2, "Still Here")];
        let merged = merge_app_lists(&[existing], incoming);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, 2);
    }

    #[test]
    fn merge_new_app_gets_default_client_fields() {
        let merged = merge_app_lists(&[], vec![app(3, "Brand New")]);
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].hidden);
        assert_eq!(merged[0].box_art, "");
    }

    #[test]
    fn parse_app_list_reads_repeated_app_sections() {
        let xml = r#"<root status_code="200">
            <App><ID>17</ID><AppTitle>Half-Life</AppTitle><IsHdrSupported>1</IsHdrSupported></App>
            <App><ID>42</ID><AppTitle>Portal</AppTitle></App>
        </root>"#;
        let resp = crate::xml::parse_root(xml).unwrap();
        let apps = parse_app_list(&resp);
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].id, 17);
        assert_eq!(apps[0].name, "Half-Life");
        assert!(apps[0].hdr_supported);
        assert!(!apps[1].hdr_supported);
    }

    #[test]
    fn parse_app_list_empty_when_no_app_sections() {
        let resp = crate::xml::parse_root(r#"<root status_code="200"></root>"#).unwrap();
        assert!(parse_app_list(&resp).is_empty());
    }
}
