use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tracing::debug;

use super::{fmt_ts, get_enum, get_opt_json, get_opt_ts, get_ts, new_id, to_json, SqliteStore};
use crate::error::{FolioError, FolioResult};
use crate::traits::SceneStore;
use crate::types::{AnalysisCounts, AnalysisStatus, NewScene, Scene, SceneAnalysisUpdate};

const SCENE_COLUMNS: &str = "id, document_id, global_index, chapter_index, chapter_title, \
     scene_index, text, word_count, scene_type, has_dialogue, estimated_characters, speaker, \
     analysis_status, analysis, analysis_error, analyzed_at, created_at";

fn row_to_scene(row: &Row<'_>) -> rusqlite::Result<Scene> {
    Ok(Scene {
        id: row.get(0)?,
        document_id: row.get(1)?,
        global_index: row.get(2)?,
        chapter_index: row.get(3)?,
        chapter_title: row.get(4)?,
        scene_index: row.get(5)?,
        text: row.get(6)?,
        word_count: row.get(7)?,
        scene_type: get_enum(row, 8)?,
        has_dialogue: row.get(9)?,
        estimated_characters: row.get(10)?,
        speaker: row.get(11)?,
        analysis_status: get_enum(row, 12)?,
        analysis: get_opt_json(row, 13)?,
        analysis_error: row.get(14)?,
        analyzed_at: get_opt_ts(row, 15)?,
        created_at: get_ts(row, 16)?,
    })
}

#[async_trait]
impl SceneStore for SqliteStore {
    async fn replace_scenes(&self, document_id: &str, scenes: Vec<NewScene>) -> FolioResult<usize> {
        let now = fmt_ts(&Utc::now());
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let removed = tx.execute("DELETE FROM scenes WHERE document_id = ?1", params![document_id])?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO scenes ({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, NULL, NULL, NULL, ?14)",
                SCENE_COLUMNS
            ))?;
            for scene in &scenes {
                stmt.execute(params![
                    new_id(),
                    document_id,
                    scene.global_index,
                    scene.chapter_index,
                    scene.chapter_title,
                    scene.scene_index,
                    scene.text,
                    scene.word_count,
                    scene.scene_type.to_string(),
                    scene.has_dialogue,
                    scene.estimated_characters,
                    scene.speaker,
                    AnalysisStatus::Pending.to_string(),
                    now,
                ])?;
            }
        }
        tx.commit()?;

        debug!(document_id, removed, stored = scenes.len(), "Replaced scenes");
        Ok(scenes.len())
    }

    async fn list_scenes(&self, document_id: &str) -> FolioResult<Vec<Scene>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scenes WHERE document_id = ?1 ORDER BY global_index",
            SCENE_COLUMNS
        ))?;
        let scenes = stmt
            .query_map(params![document_id], row_to_scene)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(scenes)
    }

    async fn list_scenes_with_status(
        &self,
        document_id: &str,
        statuses: &[AnalysisStatus],
    ) -> FolioResult<Vec<Scene>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (0..statuses.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM scenes WHERE document_id = ?1 AND analysis_status IN ({}) \
             ORDER BY global_index",
            SCENE_COLUMNS, placeholders
        );

        let mut values = Vec::with_capacity(statuses.len() + 1);
        values.push(document_id.to_string());
        values.extend(statuses.iter().map(|s| s.to_string()));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let scenes = stmt
            .query_map(params_from_iter(values.iter()), row_to_scene)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(scenes)
    }

    async fn get_scene(&self, scene_id: &str) -> FolioResult<Option<Scene>> {
        let conn = self.conn()?;
        let scene = conn
            .query_row(
                &format!("SELECT {} FROM scenes WHERE id = ?1", SCENE_COLUMNS),
                params![scene_id],
                row_to_scene,
            )
            .optional()?;
        Ok(scene)
    }

    async fn update_scene_analysis(
        &self,
        scene_id: &str,
        update: SceneAnalysisUpdate,
    ) -> FolioResult<()> {
        let conn = self.conn()?;
        let current: Option<String> = conn
            .query_row(
                "SELECT analysis_status FROM scenes WHERE id = ?1",
                params![scene_id],
                |row| row.get(0),
            )
            .optional()?;
        let current: AnalysisStatus = current
            .ok_or_else(|| FolioError::scene_not_found(scene_id))?
            .parse()
            .map_err(|_| FolioError::database(format!("Corrupt analysis status on scene {}", scene_id)))?;

        let next = update.status();
        if !current.can_advance_to(next) {
            return Err(FolioError::invalid_state(format!(
                "Scene {} cannot move from '{}' to '{}'",
                scene_id, current, next
            )));
        }

        match update {
            SceneAnalysisUpdate::Started => {
                conn.execute(
                    "UPDATE scenes SET analysis_status = ?2, analysis_error = NULL WHERE id = ?1",
                    params![scene_id, next.to_string()],
                )?;
            }
            SceneAnalysisUpdate::Completed(analysis) => {
                conn.execute(
                    "UPDATE scenes SET analysis_status = ?2, analysis = ?3, analysis_error = NULL, \
                     analyzed_at = ?4 WHERE id = ?1",
                    params![
                        scene_id,
                        next.to_string(),
                        to_json(&analysis)?,
                        fmt_ts(&Utc::now())
                    ],
                )?;
            }
            SceneAnalysisUpdate::Failed(error) => {
                conn.execute(
                    "UPDATE scenes SET analysis_status = ?2, analysis_error = ?3 WHERE id = ?1",
                    params![scene_id, next.to_string(), error],
                )?;
            }
        }
        Ok(())
    }

    async fn analysis_counts(&self, document_id: &str) -> FolioResult<AnalysisCounts> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT analysis_status, COUNT(*) FROM scenes WHERE document_id = ?1 \
             GROUP BY analysis_status",
        )?;
        let rows = stmt
            .query_map(params![document_id], |row| {
                Ok((get_enum::<AnalysisStatus>(row, 0)?, row.get::<_, u32>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts = AnalysisCounts::default();
        for (status, count) in rows {
            match status {
                AnalysisStatus::Pending => counts.pending = count,
                AnalysisStatus::Processing => counts.processing = count,
                AnalysisStatus::Completed => counts.completed = count,
                AnalysisStatus::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }
}
