//! Authenticated users

use serde::{Deserialize, Serialize};

use super::row::{value_as_text, RawRow, RowExt};

/// Agency id granting visibility on every agency.
pub const ALL_AGENCIES_ID: &str = "TOUTES";

/// User record returned at login and kept in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "userId")]
    pub id: String,
    #[serde(rename = "userName")]
    pub name: String,
    #[serde(rename = "userEmail")]
    pub email: Option<String>,
    /// Agency codes the user may see; contains `TOUTES` for all-agency users
    #[serde(rename = "userAgenceIds")]
    pub agency_ids: Vec<String>,
    #[serde(rename = "userService")]
    pub service: Option<String>,
}

impl UserRecord {
    pub fn sees_all_agencies(&self) -> bool {
        self.agency_ids
            .iter()
            .any(|id| id.eq_ignore_ascii_case(ALL_AGENCIES_ID))
    }

    pub fn may_see_agency(&self, code: &str) -> bool {
        self.sees_all_agencies() || self.agency_ids.iter().any(|id| id == code)
    }
}

/// User row with its stored password hash. Never serialized.
#[derive(Debug, Clone)]
pub struct StoredUser {
    pub user: UserRecord,
    pub password_hash: String,
}

impl StoredUser {
    /// Map a `Utilisateurs` row.
    ///
    /// Agency access comes from `AGENCE_<CODE>` columns set to `oui` and
    /// from a delimited `USER_AGENCE_IDS` list; both forms are merged.
    pub fn from_row(row: &RawRow) -> Option<Self> {
        let mut agency_ids: Vec<String> = Vec::new();
        let mut push = |code: &str| {
            let code = code.trim();
            if !code.is_empty() && !agency_ids.iter().any(|c| c == code) {
                agency_ids.push(code.to_string());
            }
        };

        for (column, value) in row {
            let upper = column.to_uppercase();
            if let Some(code) = upper.strip_prefix("AGENCE_") {
                let granted = value_as_text(value).is_some_and(|v| v.eq_ignore_ascii_case("oui"));
                if granted {
                    push(code);
                }
            }
        }
        if let Some(list) = row.text(&["USER_AGENCE_IDS"]) {
            list.split([',', ';']).for_each(&mut push);
        }

        Some(Self {
            user: UserRecord {
                id: row.text(&["ID"])?,
                name: row.text(&["USER_NAME"])?,
                email: row.text(&["EMAIL"]),
                agency_ids,
                service: row.text(&["USER_SERVICE"]),
            },
            password_hash: row.text(&["PASSWORD_HASH"]).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_row_collects_agency_flags_and_list() {
        let row = json!({
            "id": 7,
            "user_name": "mdupont",
            "email": "m.dupont@example.org",
            "agence_bblpau": "OUI",
            "agence_tif69": "non",
            "user_agence_ids": "BBLLIL, BBLPAU",
            "user_service": "Comptabilité",
            "password_hash": "pbkdf2-sha256$10000$c2FsdA$aGFzaA",
        });
        let stored = StoredUser::from_row(row.as_object().unwrap()).unwrap();
        let mut ids = stored.user.agency_ids.clone();
        ids.sort();
        assert_eq!(ids, vec!["BBLLIL", "BBLPAU"]);
        assert_eq!(stored.user.id, "7");
        assert!(!stored.user.sees_all_agencies());
        assert!(stored.user.may_see_agency("BBLLIL"));
        assert!(!stored.user.may_see_agency("TIF69"));
    }

    #[test]
    fn test_toutes_flag_grants_all_agencies() {
        let row = json!({"ID": "1", "USER_NAME": "admin", "AGENCE_TOUTES": "oui"});
        let stored = StoredUser::from_row(row.as_object().unwrap()).unwrap();
        assert!(stored.user.sees_all_agencies());
        assert!(stored.user.may_see_agency("ANYTHING"));
    }

    #[test]
    fn test_user_record_wire_names() {
        let user = UserRecord {
            id: "1".into(),
            name: "admin".into(),
            email: None,
            agency_ids: vec!["TOUTES".into()],
            service: Some("DSI".into()),
        };
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["userName"], "admin");
        assert_eq!(value["userAgenceIds"], json!(["TOUTES"]));
        assert_eq!(value["userService"], "DSI");
    }
}
