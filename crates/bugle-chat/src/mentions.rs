use uuid::Uuid;

use bugle_db::Database;
use bugle_types::models::UserSummary;

use crate::error::ChatError;

/// Distinct `@name` candidates in a message body, first-seen order.
/// A name is a maximal run of word characters after the `@`.
pub fn scan(body: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '@' {
            continue;
        }
        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }
        if !name.is_empty() && !names.iter().any(|n| n == &name) {
            names.push(name);
        }
    }
    names
}

/// Resolve `@name` tokens against the user directory and record a mention
/// row per resolved user. Best-effort: unmatched tokens are dropped, and a
/// mention row that already exists for this message is left alone.
/// Returns the resolved users so callers can enrich broadcast payloads.
pub fn resolve(db: &Database, message_id: Uuid, body: &str) -> Result<Vec<UserSummary>, ChatError> {
    let mut resolved = Vec::new();
    for name in scan(body) {
        let Some(row) = db.get_user_by_name(&name)? else {
            continue;
        };
        let user = row.into_summary();
        db.insert_mention(&message_id.to_string(), &user.id.to_string())?;
        resolved.push(user);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use crate::testutil::fixture;

    use super::*;

    #[test]
    fn scan_finds_word_tokens() {
        assert_eq!(scan("hey @alice check this"), vec!["alice"]);
        assert_eq!(scan("@alice @bob_2: ping"), vec!["alice", "bob_2"]);
        assert_eq!(scan("(@alice)"), vec!["alice"]);
    }

    #[test]
    fn scan_dedups_and_skips_bare_at() {
        assert_eq!(scan("@alice and @alice again"), vec!["alice"]);
        assert!(scan("meet @ noon").is_empty());
        assert!(scan("no mentions here").is_empty());
    }

    #[test]
    fn scan_stops_at_non_word_characters() {
        assert_eq!(scan("@alice,@bob!"), vec!["alice", "bob"]);
        assert_eq!(scan("mail me@example.org"), vec!["example"]);
    }

    #[test]
    fn resolve_records_only_known_users() {
        let fx = fixture();
        let message_id = fx.post(fx.alice, "hey @bob and @nobody");

        let resolved = resolve(&fx.db, message_id, "hey @bob and @nobody").unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, fx.bob);

        let mentioned = fx.db.mentioned_users(&message_id.to_string()).unwrap();
        assert_eq!(mentioned.len(), 1);
        assert_eq!(mentioned[0].name, "bob");
    }

    #[test]
    fn resolve_is_idempotent_per_message() {
        let fx = fixture();
        let message_id = fx.post(fx.alice, "@bob @bob");

        resolve(&fx.db, message_id, "@bob @bob").unwrap();
        resolve(&fx.db, message_id, "@bob @bob").unwrap();

        assert_eq!(fx.db.mentioned_users(&message_id.to_string()).unwrap().len(), 1);
    }
}
