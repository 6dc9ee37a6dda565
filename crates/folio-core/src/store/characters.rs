use std::collections::HashSet;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row, Transaction};

use super::{fmt_ts, get_enum, get_json, get_ts, to_json, SqliteStore};
use crate::error::FolioResult;
use crate::traits::CharacterStore;
use crate::types::{Character, Setting};

const CHARACTER_COLUMNS: &str = "id, document_id, name, aliases, role, profile, profile_source, \
     synthesis_error, first_scene_id, first_scene_index, mention_count, scene_count, created_at, \
     updated_at";

const SETTING_COLUMNS: &str =
    "id, document_id, name, description, keywords, scene_count, first_scene_index, created_at";

fn row_to_character(row: &Row<'_>) -> rusqlite::Result<Character> {
    Ok(Character {
        id: row.get(0)?,
        document_id: row.get(1)?,
        name: row.get(2)?,
        aliases: get_json(row, 3)?,
        role: get_enum(row, 4)?,
        profile: get_json(row, 5)?,
        profile_source: get_enum(row, 6)?,
        synthesis_error: row.get(7)?,
        first_scene_id: row.get(8)?,
        first_scene_index: row.get(9)?,
        mention_count: row.get(10)?,
        scene_count: row.get(11)?,
        created_at: get_ts(row, 12)?,
        updated_at: get_ts(row, 13)?,
    })
}

fn row_to_setting(row: &Row<'_>) -> rusqlite::Result<Setting> {
    Ok(Setting {
        id: row.get(0)?,
        document_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        keywords: get_json(row, 4)?,
        scene_count: row.get(5)?,
        first_scene_index: row.get(6)?,
        created_at: get_ts(row, 7)?,
    })
}

/// Delete the document's rows in `table` whose id is not in `keep`.
fn delete_absent(
    tx: &Transaction<'_>,
    table: &str,
    document_id: &str,
    keep: &HashSet<&str>,
) -> FolioResult<usize> {
    let existing: Vec<String> = {
        let mut stmt = tx.prepare(&format!("SELECT id FROM {} WHERE document_id = ?1", table))?;
        let ids = stmt
            .query_map(params![document_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        ids
    };

    let mut removed = 0;
    for id in existing.iter().filter(|id| !keep.contains(id.as_str())) {
        removed += tx.execute(&format!("DELETE FROM {} WHERE id = ?1", table), params![id])?;
    }
    Ok(removed)
}

#[async_trait]
impl CharacterStore for SqliteStore {
    async fn replace_characters(
        &self,
        document_id: &str,
        characters: Vec<Character>,
    ) -> FolioResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let keep: HashSet<&str> = characters.iter().map(|c| c.id.as_str()).collect();
        delete_absent(&tx, "characters", document_id, &keep)?;

        {
            // created_at survives re-runs; everything else is overwritten
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO characters ({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14) \
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, aliases = excluded.aliases, \
                 role = excluded.role, profile = excluded.profile, \
                 profile_source = excluded.profile_source, \
                 synthesis_error = excluded.synthesis_error, first_scene_id = excluded.first_scene_id, \
                 first_scene_index = excluded.first_scene_index, \
                 mention_count = excluded.mention_count, scene_count = excluded.scene_count, \
                 updated_at = excluded.updated_at",
                CHARACTER_COLUMNS
            ))?;
            for character in &characters {
                stmt.execute(params![
                    character.id,
                    document_id,
                    character.name,
                    to_json(&character.aliases)?,
                    character.role.to_string(),
                    to_json(&character.profile)?,
                    character.profile_source.to_string(),
                    character.synthesis_error,
                    character.first_scene_id,
                    character.first_scene_index,
                    character.mention_count,
                    character.scene_count,
                    fmt_ts(&character.created_at),
                    fmt_ts(&character.updated_at),
                ])?;
            }
        }
        tx.commit()?;

        Ok(characters.len())
    }

    async fn list_characters(&self, document_id: &str) -> FolioResult<Vec<Character>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM characters WHERE document_id = ?1 ORDER BY first_scene_index, name",
            CHARACTER_COLUMNS
        ))?;
        let characters = stmt
            .query_map(params![document_id], row_to_character)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(characters)
    }

    async fn get_character(&self, character_id: &str) -> FolioResult<Option<Character>> {
        let conn = self.conn()?;
        let character = conn
            .query_row(
                &format!("SELECT {} FROM characters WHERE id = ?1", CHARACTER_COLUMNS),
                params![character_id],
                row_to_character,
            )
            .optional()?;
        Ok(character)
    }

    async fn replace_settings(
        &self,
        document_id: &str,
        settings: Vec<Setting>,
    ) -> FolioResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let keep: HashSet<&str> = settings.iter().map(|s| s.id.as_str()).collect();
        delete_absent(&tx, "settings", document_id, &keep)?;

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO settings ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, \
                 description = excluded.description, keywords = excluded.keywords, \
                 scene_count = excluded.scene_count, first_scene_index = excluded.first_scene_index",
                SETTING_COLUMNS
            ))?;
            for setting in &settings {
                stmt.execute(params![
                    setting.id,
                    document_id,
                    setting.name,
                    setting.description,
                    to_json(&setting.keywords)?,
                    setting.scene_count,
                    setting.first_scene_index,
                    fmt_ts(&setting.created_at),
                ])?;
            }
        }
        tx.commit()?;

        Ok(settings.len())
    }

    async fn list_settings(&self, document_id: &str) -> FolioResult<Vec<Setting>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM settings WHERE document_id = ?1 ORDER BY first_scene_index, name",
            SETTING_COLUMNS
        ))?;
        let settings = stmt
            .query_map(params![document_id], row_to_setting)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::DocumentStore;
    use crate::types::{AppearanceProfile, CharacterRole, NewDocument, ProfileSource};
    use chrono::Utc;
    use folio_extractors::SourceFormat;

    async fn store_with_document() -> (SqliteStore, String) {
        let store = SqliteStore::in_memory().unwrap();
        let document = store
            .create_document(NewDocument {
                owner_id: "alice".to_string(),
                title: None,
                source_path: "alice/book.epub".to_string(),
                source_format: SourceFormat::Epub,
                content_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        (store, document.id)
    }

    fn character(doc: &str, name: &str, first: u32) -> Character {
        let now = Utc::now();
        Character {
            id: Character::derive_id(doc, name),
            document_id: doc.to_string(),
            name: name.to_string(),
            aliases: vec![],
            role: CharacterRole::Minor,
            profile: AppearanceProfile::default(),
            profile_source: ProfileSource::Fallback,
            synthesis_error: None,
            first_scene_id: None,
            first_scene_index: first,
            mention_count: 1,
            scene_count: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_replace_characters_upserts_and_prunes() {
        let (store, doc) = store_with_document().await;
        store
            .replace_characters(&doc, vec![character(&doc, "Arya", 3), character(&doc, "Sansa", 1)])
            .await
            .unwrap();

        let mut arya = character(&doc, "Arya", 3);
        arya.aliases = vec!["Arry".to_string()];
        arya.role = CharacterRole::Protagonist;
        store
            .replace_characters(&doc, vec![arya.clone(), character(&doc, "Bran", 0)])
            .await
            .unwrap();

        let characters = store.list_characters(&doc).await.unwrap();
        let names: Vec<&str> = characters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Bran", "Arya"]);

        let loaded = store.get_character(&arya.id).await.unwrap().unwrap();
        assert_eq!(loaded.aliases, vec!["Arry"]);
        assert_eq!(loaded.role, CharacterRole::Protagonist);
        assert_eq!(loaded.synthesis_error, None);
    }

    #[tokio::test]
    async fn test_synthesis_error_round_trips_and_clears() {
        let (store, doc) = store_with_document().await;
        let mut hodor = character(&doc, "Hodor", 2);
        hodor.synthesis_error = Some("Parse error: missing visual_summary".to_string());
        store.replace_characters(&doc, vec![hodor.clone()]).await.unwrap();

        let loaded = store.get_character(&hodor.id).await.unwrap().unwrap();
        assert_eq!(loaded.synthesis_error, hodor.synthesis_error);

        hodor.synthesis_error = None;
        hodor.profile_source = ProfileSource::Synthesized;
        store.replace_characters(&doc, vec![hodor.clone()]).await.unwrap();
        let loaded = store.get_character(&hodor.id).await.unwrap().unwrap();
        assert_eq!(loaded.synthesis_error, None);
        assert_eq!(loaded.profile_source, ProfileSource::Synthesized);
    }

    #[tokio::test]
    async fn test_rerun_keeps_character_ids() {
        let (store, doc) = store_with_document().await;
        let first = character(&doc, "Jon Snow", 0);
        store.replace_characters(&doc, vec![first.clone()]).await.unwrap();
        store
            .replace_characters(&doc, vec![character(&doc, "jon  snow", 0)])
            .await
            .unwrap();

        let characters = store.list_characters(&doc).await.unwrap();
        assert_eq!(characters.len(), 1);
        assert_eq!(characters[0].id, first.id);
    }

    #[tokio::test]
    async fn test_replace_settings() {
        let (store, doc) = store_with_document().await;
        let setting = Setting {
            id: Setting::derive_id(&doc, "Winterfell"),
            document_id: doc.clone(),
            name: "Winterfell".to_string(),
            description: "Winterfell, dusk".to_string(),
            keywords: vec!["snow".to_string()],
            scene_count: 4,
            first_scene_index: 0,
            created_at: Utc::now(),
        };
        store.replace_settings(&doc, vec![setting]).await.unwrap();

        let settings = store.list_settings(&doc).await.unwrap();
        assert_eq!(settings.len(), 1);
        assert_eq!(settings[0].keywords, vec!["snow"]);

        store.replace_settings(&doc, vec![]).await.unwrap();
        assert!(store.list_settings(&doc).await.unwrap().is_empty());
    }
}
