use chrono::Utc;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use common::{AnalysisPhase, StageStatus, VisibilityStatus};

use crate::entity::asset;
use crate::locks::AssetLocks;

/// Metadata bag keys the reconciler reads and repairs.
pub mod keys {
    pub const THUMBNAILS: &str = "thumbnails";
    pub const THUMBNAILS_GENERATED: &str = "thumbnails_generated";
    pub const METADATA_EXTRACTED: &str = "metadata_extracted";
    pub const PROCESSING_FAILED: &str = "processing_failed";
    pub const FAILURE_TERMINAL: &str = "failure_terminal";
    pub const VISIBILITY_OVERRIDE: &str = "visibility_override";
}

/// The slice of an asset the reconciliation rules operate on.
#[derive(Debug, Clone)]
pub struct AssetSnapshot {
    pub visibility: VisibilityStatus,
    pub thumbnail_status: StageStatus,
    pub metadata_status: StageStatus,
    pub tagging_status: StageStatus,
    pub promotion_status: StageStatus,
    pub analysis_phase: AnalysisPhase,
    pub metadata: serde_json::Value,
}

impl From<&asset::Model> for AssetSnapshot {
    fn from(m: &asset::Model) -> Self {
        Self {
            visibility: m.visibility,
            thumbnail_status: m.thumbnail_status,
            metadata_status: m.metadata_status,
            tagging_status: m.tagging_status,
            promotion_status: m.promotion_status,
            analysis_phase: m.analysis_phase,
            metadata: m.metadata.clone(),
        }
    }
}

/// One corrected field, for operator-facing change logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct FieldChange {
    pub field: String,
    pub from: String,
    pub to: String,
}

impl FieldChange {
    fn new(field: impl Into<String>, from: impl ToString, to: impl ToString) -> Self {
        Self {
            field: field.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub updated: bool,
    pub changes: Vec<FieldChange>,
    /// Corrected state to persist. Equal to the input when `updated` is false.
    pub visibility: VisibilityStatus,
    pub analysis_phase: AnalysisPhase,
    pub metadata: serde_json::Value,
}

/// Read a boolean flag from the metadata bag.
///
/// Anything other than a literal `true` (absent key, wrong type, malformed
/// bag) reads as unset: the rules never assert success they cannot infer.
fn flag(metadata: &serde_json::Value, key: &str) -> bool {
    metadata.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// Whether the bag holds non-empty derived media under `key`.
fn has_derived_media(metadata: &serde_json::Value, key: &str) -> bool {
    match metadata.get(key) {
        Some(serde_json::Value::Array(items)) => !items.is_empty(),
        Some(serde_json::Value::Object(map)) => !map.is_empty(),
        _ => false,
    }
}

/// The analysis phase implied by the evidence on hand: each stage status and
/// each legacy flag implies a minimum phase, and the furthest one wins. A
/// stage that never started implies nothing, so a fresh asset stays at
/// `Uploading`.
fn implied_phase(s: &AssetSnapshot) -> AnalysisPhase {
    let mut implied = AnalysisPhase::Uploading;

    let stage_evidence = [
        (
            s.thumbnail_status,
            AnalysisPhase::GeneratingThumbnails,
            AnalysisPhase::ExtractingMetadata,
        ),
        (
            s.metadata_status,
            AnalysisPhase::ExtractingMetadata,
            AnalysisPhase::Tagging,
        ),
        (
            s.tagging_status,
            AnalysisPhase::Tagging,
            AnalysisPhase::Promoting,
        ),
        (
            s.promotion_status,
            AnalysisPhase::Promoting,
            AnalysisPhase::Complete,
        ),
    ];
    for (status, running, done) in stage_evidence {
        match status {
            StageStatus::Pending => {}
            StageStatus::Processing | StageStatus::Failed => implied = implied.max(running),
            // A skipped promotion does not complete a pipeline.
            StageStatus::Skipped if done == AnalysisPhase::Complete => {
                implied = implied.max(running)
            }
            StageStatus::Completed | StageStatus::Skipped => implied = implied.max(done),
        }
    }

    // Legacy flags can run ahead of the typed columns; take the furthest.
    if flag(&s.metadata, keys::THUMBNAILS_GENERATED) {
        implied = implied.max(AnalysisPhase::ExtractingMetadata);
    }
    if flag(&s.metadata, keys::METADATA_EXTRACTED) {
        implied = implied.max(AnalysisPhase::Tagging);
    }
    implied
}

/// The one place that decides end-user visibility.
///
/// Every pipeline and reconciliation call site goes through this function;
/// no other code flips `visibility`.
pub fn derive_visibility(s: &AssetSnapshot) -> VisibilityStatus {
    if flag(&s.metadata, keys::VISIBILITY_OVERRIDE) {
        // A human explicitly pinned visibility; leave it alone.
        return s.visibility;
    }
    if flag(&s.metadata, keys::PROCESSING_FAILED) {
        return if flag(&s.metadata, keys::FAILURE_TERMINAL) {
            VisibilityStatus::Failed
        } else {
            VisibilityStatus::Hidden
        };
    }
    if s.promotion_status == StageStatus::Completed {
        VisibilityStatus::Visible
    } else {
        VisibilityStatus::Hidden
    }
}

/// Inspect a snapshot and derive corrections for any detected inconsistency.
///
/// Pure and idempotent: reconciling the corrected state again yields
/// `updated = false`. No rule regresses a later-stage flag or the analysis
/// phase.
pub fn reconcile(s: &AssetSnapshot) -> Reconciliation {
    let mut changes = Vec::new();
    let mut metadata = if s.metadata.is_object() {
        s.metadata.clone()
    } else {
        // Malformed bag: work on an empty one rather than erroring. Flags we
        // cannot read are treated as unset.
        serde_json::json!({})
    };

    // Thumbnails exist but the flag was never set.
    if s.thumbnail_status == StageStatus::Completed
        && has_derived_media(&metadata, keys::THUMBNAILS)
        && !flag(&metadata, keys::THUMBNAILS_GENERATED)
    {
        metadata[keys::THUMBNAILS_GENERATED] = serde_json::Value::Bool(true);
        changes.push(FieldChange::new(
            format!("metadata.{}", keys::THUMBNAILS_GENERATED),
            "unset",
            "true",
        ));
    }

    // Extraction completed but the flag was never set.
    if s.metadata_status == StageStatus::Completed && !flag(&metadata, keys::METADATA_EXTRACTED) {
        metadata[keys::METADATA_EXTRACTED] = serde_json::Value::Bool(true);
        changes.push(FieldChange::new(
            format!("metadata.{}", keys::METADATA_EXTRACTED),
            "unset",
            "true",
        ));
    }

    // Advance a lagging phase cursor. Never regress it.
    let with_flags = AssetSnapshot {
        metadata: metadata.clone(),
        ..s.clone()
    };
    let implied = implied_phase(&with_flags);
    let analysis_phase = s.analysis_phase.max(implied);
    if analysis_phase != s.analysis_phase {
        changes.push(FieldChange::new(
            "analysis_phase",
            s.analysis_phase,
            analysis_phase,
        ));
    }

    // Visibility must agree with the derived state; in particular an asset
    // must never stay visible while a blocking failure flag is set.
    let visibility = derive_visibility(&with_flags);
    if visibility != s.visibility {
        changes.push(FieldChange::new("visibility", s.visibility, visibility));
    }

    Reconciliation {
        updated: !changes.is_empty(),
        changes,
        visibility,
        analysis_phase,
        metadata,
    }
}

/// Persisting wrapper around the pure rules.
#[derive(Clone)]
pub struct Reconciler {
    db: DatabaseConnection,
    locks: AssetLocks,
}

impl Reconciler {
    pub fn new(db: DatabaseConnection, locks: AssetLocks) -> Self {
        Self { db, locks }
    }

    /// Reconcile one asset and persist any corrections.
    ///
    /// Runs under the per-asset lock and a row lock; the asset `version` is
    /// bumped so concurrent writers notice. Creates and resolves no
    /// incidents.
    #[instrument(skip(self), fields(asset_id = %asset_id))]
    pub async fn reconcile_asset(&self, asset_id: Uuid) -> anyhow::Result<Reconciliation> {
        let _guard = self.locks.acquire(asset_id).await;

        let txn = self.db.begin().await?;

        let Some(model) = asset::Entity::find_by_id(asset_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
        else {
            txn.rollback().await?;
            anyhow::bail!("Asset {asset_id} not found");
        };

        let snapshot = AssetSnapshot::from(&model);
        let outcome = reconcile(&snapshot);

        if !outcome.updated {
            txn.rollback().await?;
            return Ok(outcome);
        }

        let update = asset::ActiveModel {
            id: Set(model.id),
            visibility: Set(outcome.visibility),
            analysis_phase: Set(outcome.analysis_phase),
            metadata: Set(outcome.metadata.clone()),
            version: Set(model.version + 1),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        update.update(&txn).await?;

        txn.commit().await?;

        info!(
            asset_id = %asset_id,
            changes = outcome.changes.len(),
            "Reconciled asset state"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> AssetSnapshot {
        AssetSnapshot {
            visibility: VisibilityStatus::Hidden,
            thumbnail_status: StageStatus::Pending,
            metadata_status: StageStatus::Pending,
            tagging_status: StageStatus::Pending,
            promotion_status: StageStatus::Pending,
            analysis_phase: AnalysisPhase::Uploading,
            metadata: json!({}),
        }
    }

    fn apply(s: &AssetSnapshot) -> AssetSnapshot {
        let r = reconcile(s);
        AssetSnapshot {
            visibility: r.visibility,
            analysis_phase: r.analysis_phase,
            metadata: r.metadata,
            ..s.clone()
        }
    }

    #[test]
    fn clean_asset_needs_no_correction() {
        let r = reconcile(&snapshot());
        assert!(!r.updated);
        assert!(r.changes.is_empty());
    }

    #[test]
    fn sets_thumbnails_generated_when_media_exists() {
        let mut s = snapshot();
        s.thumbnail_status = StageStatus::Completed;
        s.metadata = json!({"thumbnails": ["t-small.webp", "t-large.webp"]});

        let r = reconcile(&s);
        assert!(r.updated);
        assert_eq!(r.metadata["thumbnails_generated"], json!(true));
        assert!(
            r.changes
                .iter()
                .any(|c| c.field == "metadata.thumbnails_generated")
        );
    }

    #[test]
    fn empty_thumbnail_list_does_not_assert_success() {
        let mut s = snapshot();
        s.thumbnail_status = StageStatus::Completed;
        s.metadata = json!({"thumbnails": []});

        let r = reconcile(&s);
        assert!(r.metadata.get("thumbnails_generated").is_none());
    }

    #[test]
    fn advances_stale_phase_from_later_stage_flag() {
        let mut s = snapshot();
        s.analysis_phase = AnalysisPhase::Uploading;
        s.metadata = json!({"metadata_extracted": true});

        let r = reconcile(&s);
        assert!(r.updated);
        assert!(r.analysis_phase.rank() > AnalysisPhase::Uploading.rank());
    }

    #[test]
    fn never_regresses_phase() {
        let mut s = snapshot();
        s.analysis_phase = AnalysisPhase::Complete;
        // Stage columns say nothing has run; the cursor still must not move
        // backward.
        let r = reconcile(&s);
        assert_eq!(r.analysis_phase, AnalysisPhase::Complete);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut s = snapshot();
        s.thumbnail_status = StageStatus::Completed;
        s.metadata_status = StageStatus::Completed;
        s.metadata = json!({"thumbnails": ["a.webp"]});

        let first = reconcile(&s);
        assert!(first.updated);

        let corrected = apply(&s);
        let second = reconcile(&corrected);
        assert!(!second.updated, "second pass changed: {:?}", second.changes);
    }

    #[test]
    fn visible_with_failure_flag_is_repaired() {
        let mut s = snapshot();
        s.visibility = VisibilityStatus::Visible;
        s.metadata = json!({"processing_failed": true});

        let r = reconcile(&s);
        assert!(r.updated);
        assert_eq!(r.visibility, VisibilityStatus::Hidden);

        // Terminal failures surface to the user as failed.
        s.metadata = json!({"processing_failed": true, "failure_terminal": true});
        let r = reconcile(&s);
        assert_eq!(r.visibility, VisibilityStatus::Failed);
    }

    #[test]
    fn override_pins_visibility() {
        let mut s = snapshot();
        s.visibility = VisibilityStatus::Visible;
        s.metadata = json!({"processing_failed": true, "visibility_override": true});

        let r = reconcile(&s);
        assert_eq!(r.visibility, VisibilityStatus::Visible);
    }

    #[test]
    fn promotion_completion_makes_asset_visible() {
        let mut s = snapshot();
        s.thumbnail_status = StageStatus::Completed;
        s.metadata_status = StageStatus::Completed;
        s.tagging_status = StageStatus::Skipped;
        s.promotion_status = StageStatus::Completed;
        s.metadata = json!({
            "thumbnails": ["a.webp"],
            "thumbnails_generated": true,
            "metadata_extracted": true,
        });

        let r = reconcile(&s);
        assert_eq!(r.visibility, VisibilityStatus::Visible);
        assert_eq!(r.analysis_phase, AnalysisPhase::Complete);
    }

    #[test]
    fn malformed_metadata_reads_as_unknown() {
        let mut s = snapshot();
        s.thumbnail_status = StageStatus::Completed;
        // Wrong types everywhere: none of these count as set.
        s.metadata = json!({
            "thumbnails": 7,
            "thumbnails_generated": "yes",
            "processing_failed": "true",
        });

        let r = reconcile(&s);
        assert!(r.metadata.get("thumbnails_generated").map(|v| v.as_bool()) != Some(Some(true)));
        assert_eq!(r.visibility, VisibilityStatus::Hidden);
    }

    #[test]
    fn non_object_bag_is_tolerated() {
        let mut s = snapshot();
        s.metadata = json!("corrupted");
        s.metadata_status = StageStatus::Completed;

        let r = reconcile(&s);
        // Never throws; conservatively starts from an empty bag.
        assert_eq!(r.metadata["metadata_extracted"], json!(true));
    }

    #[test]
    fn derive_visibility_is_the_single_authority() {
        let mut s = snapshot();
        s.promotion_status = StageStatus::Completed;
        assert_eq!(derive_visibility(&s), VisibilityStatus::Visible);

        s.metadata = json!({"processing_failed": true});
        assert_ne!(derive_visibility(&s), VisibilityStatus::Visible);
    }
}
