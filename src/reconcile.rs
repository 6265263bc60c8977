use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::model::{IncomingRow, OperatorRecord, ReconcileCounts, ReconciliationPlan};

/// Which existing records the absence pass may disable. Sources that are
/// not complete national rosters must use `None`: absence from a partial
/// export says nothing about an operator's authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbsenceScope {
    None,
    CallsignPrefix(String),
    Country(String),
}

impl AbsenceScope {
    fn matches(&self, record: &OperatorRecord) -> bool {
        match self {
            Self::None => false,
            Self::CallsignPrefix(prefix) => record.callsign.starts_with(prefix.as_str()),
            Self::Country(country) => record.country == *country,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::None => "none".to_string(),
            Self::CallsignPrefix(prefix) => format!("prefix:{prefix}"),
            Self::Country(country) => format!("country:{country}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// The source batch's stated validity instant. Absent when the source
    /// carries no usable cutoff; in that case the absence pass disables
    /// nothing, since freshness cannot be established.
    pub cutoff: Option<DateTime<Utc>>,
    pub absence_scope: AbsenceScope,
    pub now: DateTime<Utc>,
}

/// Compute the update plan for one batch against the full registry
/// snapshot. Storage is never touched here; the caller applies
/// `plan.upserts` through the persistence collaborator.
pub fn reconcile(
    incoming: &[IncomingRow],
    existing: &[OperatorRecord],
    options: &ReconcileOptions,
) -> ReconciliationPlan {
    let batch = dedupe_by_callsign(incoming);

    let existing_by_callsign = existing
        .iter()
        .map(|record| (record.callsign.as_str(), record))
        .collect::<HashMap<&str, &OperatorRecord>>();

    let mut counts = ReconcileCounts {
        total: batch.len(),
        ..ReconcileCounts::default()
    };
    let mut upserts = Vec::<OperatorRecord>::new();

    for row in &batch {
        let Some(current) = existing_by_callsign.get(row.callsign.as_str()) else {
            upserts.push(insert_from_row(row, options.now));
            counts.new += 1;
            continue;
        };

        if batch_is_stale_for(options.cutoff, current) {
            counts.unchanged += 1;
            continue;
        }

        if expiration_is_newer(row.expires_at, current.expires_at) || fields_differ(current, row) {
            upserts.push(update_from_row(current, row, options.now));
            counts.updated += 1;
            continue;
        }

        if !current.enabled && row.enabled {
            upserts.push(reenable(current, row, options.now));
            counts.reenabled += 1;
            continue;
        }

        counts.unchanged += 1;
    }

    if options.absence_scope != AbsenceScope::None {
        let present = batch
            .iter()
            .map(|row| row.callsign.as_str())
            .collect::<HashSet<&str>>();

        for record in existing {
            if present.contains(record.callsign.as_str())
                || !options.absence_scope.matches(record)
                || !record.enabled
            {
                continue;
            }

            if is_protected(record, options.cutoff) {
                counts.protected += 1;
                continue;
            }

            let mut disabled = record.clone();
            disabled.enabled = false;
            disabled.updated_at = options.now;
            upserts.push(disabled);
            counts.disabled += 1;
        }
    }

    ReconciliationPlan { upserts, counts }
}

/// Per-callsign dedup for batches an extractor did not already dedupe:
/// the row with the latest non-empty expiration wins, first-seen on ties
/// or when neither carries one.
fn dedupe_by_callsign(incoming: &[IncomingRow]) -> Vec<IncomingRow> {
    let mut kept = Vec::<IncomingRow>::new();
    let mut index_by_callsign = HashMap::<String, usize>::new();

    for row in incoming {
        match index_by_callsign.get(&row.callsign) {
            None => {
                index_by_callsign.insert(row.callsign.clone(), kept.len());
                kept.push(row.clone());
            }
            Some(&index) => {
                if expiration_is_newer(row.expires_at, kept[index].expires_at) {
                    kept[index] = row.clone();
                }
            }
        }
    }

    kept
}

/// Absent expirations order below every present one.
fn expiration_is_newer(
    candidate: Option<DateTime<Utc>>,
    current: Option<DateTime<Utc>>,
) -> bool {
    match (candidate, current) {
        (Some(candidate), Some(current)) => candidate > current,
        (Some(_), None) => true,
        _ => false,
    }
}

fn batch_is_stale_for(cutoff: Option<DateTime<Utc>>, current: &OperatorRecord) -> bool {
    cutoff
        .map(|cutoff| cutoff < current.updated_at)
        .unwrap_or(false)
}

fn fields_differ(current: &OperatorRecord, row: &IncomingRow) -> bool {
    current.name != row.name
        || current.category != row.category
        || current.operator_type != row.operator_type
        || current.region != row.region
        || current.district != row.district
        || current.province != row.province
        || current.department != row.department
        || current.license != row.license
        || current.resolution != row.resolution
        || current.expires_at != row.expires_at
        || (current.enabled && !row.enabled)
}

fn is_protected(record: &OperatorRecord, cutoff: Option<DateTime<Utc>>) -> bool {
    let Some(cutoff) = cutoff else {
        return true;
    };

    record.updated_at > cutoff
        || record
            .expires_at
            .map(|expires| expires > cutoff)
            .unwrap_or(false)
}

fn insert_from_row(row: &IncomingRow, now: DateTime<Utc>) -> OperatorRecord {
    OperatorRecord {
        callsign: row.callsign.clone(),
        name: row.name.clone(),
        category: row.category.clone(),
        operator_type: row.operator_type.clone(),
        region: row.region.clone(),
        district: row.district.clone(),
        province: row.province.clone(),
        department: row.department.clone(),
        license: row.license.clone(),
        resolution: row.resolution.clone(),
        expires_at: row.expires_at,
        cutoff_at: row.cutoff_at,
        enabled: row.enabled,
        country: row.country.clone(),
        updated_at: row.updated_at.unwrap_or(now),
    }
}

fn update_from_row(
    current: &OperatorRecord,
    row: &IncomingRow,
    now: DateTime<Utc>,
) -> OperatorRecord {
    let mut updated = insert_from_row(row, now);
    if updated.country.is_empty() {
        updated.country = current.country.clone();
    }
    updated
}

fn reenable(current: &OperatorRecord, row: &IncomingRow, now: DateTime<Utc>) -> OperatorRecord {
    let mut record = current.clone();
    record.enabled = true;
    record.cutoff_at = row.cutoff_at;
    record.updated_at = now;
    record
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn instant(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
    }

    fn row(callsign: &str) -> IncomingRow {
        let mut row = IncomingRow::new(callsign.to_string());
        row.name = "JUAN PEREZ".to_string();
        row.country = "PER".to_string();
        row
    }

    fn record(callsign: &str) -> OperatorRecord {
        OperatorRecord {
            callsign: callsign.to_string(),
            name: "JUAN PEREZ".to_string(),
            category: String::new(),
            operator_type: String::new(),
            region: String::new(),
            district: String::new(),
            province: String::new(),
            department: String::new(),
            license: String::new(),
            resolution: String::new(),
            expires_at: None,
            cutoff_at: None,
            enabled: true,
            country: "PER".to_string(),
            updated_at: instant(2024, 6, 1),
        }
    }

    fn options(cutoff: Option<DateTime<Utc>>, scope: AbsenceScope) -> ReconcileOptions {
        ReconcileOptions {
            cutoff,
            absence_scope: scope,
            now: instant(2025, 8, 13),
        }
    }

    #[test]
    fn new_operator_is_inserted_enabled() {
        let mut incoming = row("OA4XYZ");
        incoming.expires_at = Some(instant(2026, 1, 1));
        incoming.cutoff_at = Some(instant(2025, 1, 1));

        let plan = reconcile(
            &[incoming],
            &[],
            &options(Some(instant(2025, 1, 1)), AbsenceScope::None),
        );

        assert_eq!(plan.upserts.len(), 1);
        assert!(plan.upserts[0].enabled);
        assert_eq!(plan.upserts[0].callsign, "OA4XYZ");
        assert_eq!(
            plan.counts,
            ReconcileCounts {
                total: 1,
                new: 1,
                ..ReconcileCounts::default()
            }
        );
    }

    #[test]
    fn identical_disabled_record_is_reenabled() {
        let mut existing = record("OA4XYZ");
        existing.enabled = false;
        existing.expires_at = Some(instant(2024, 1, 1));
        existing.updated_at = instant(2023, 1, 1);

        let mut incoming = row("OA4XYZ");
        incoming.expires_at = Some(instant(2024, 1, 1));

        let plan = reconcile(
            &[incoming],
            &[existing],
            &options(Some(instant(2025, 6, 1)), AbsenceScope::None),
        );

        assert_eq!(plan.counts.reenabled, 1);
        assert_eq!(plan.upserts.len(), 1);
        assert!(plan.upserts[0].enabled);
        assert_eq!(plan.upserts[0].updated_at, instant(2025, 8, 13));
    }

    #[test]
    fn stale_batch_leaves_differing_record_unchanged() {
        let mut existing = record("OA4XYZ");
        existing.updated_at = instant(2025, 9, 1);

        let mut incoming = row("OA4XYZ");
        incoming.name = "OTRO NOMBRE".to_string();

        let plan = reconcile(
            &[incoming],
            &[existing],
            &options(Some(instant(2025, 1, 1)), AbsenceScope::None),
        );

        assert!(plan.upserts.is_empty());
        assert_eq!(plan.counts.unchanged, 1);
        assert_eq!(plan.counts.updated, 0);
    }

    #[test]
    fn absent_record_in_scope_is_disabled() {
        let mut existing = record("OA9ABC");
        existing.expires_at = Some(instant(2024, 1, 1));
        existing.updated_at = instant(2024, 6, 1);

        let plan = reconcile(
            &[],
            &[existing],
            &options(
                Some(instant(2025, 8, 1)),
                AbsenceScope::CallsignPrefix("OA".to_string()),
            ),
        );

        assert_eq!(plan.counts.disabled, 1);
        assert_eq!(plan.upserts.len(), 1);
        assert!(!plan.upserts[0].enabled);
        assert_eq!(plan.upserts[0].updated_at, instant(2025, 8, 13));
    }

    #[test]
    fn csv_variant_never_disables_absent_records() {
        let mut existing = record("OA9ABC");
        existing.expires_at = Some(instant(2024, 1, 1));
        existing.updated_at = instant(2024, 6, 1);

        let plan = reconcile(
            &[],
            &[existing],
            &options(Some(instant(2025, 8, 1)), AbsenceScope::None),
        );

        assert_eq!(plan.counts.disabled, 0);
        assert_eq!(plan.counts.protected, 0);
        assert!(plan.upserts.is_empty());
    }

    #[test]
    fn later_expiration_wins_and_reenables() {
        let mut existing = record("OA4XYZ");
        existing.enabled = false;
        existing.expires_at = Some(instant(2024, 1, 1));
        existing.updated_at = instant(2023, 1, 1);

        let mut incoming = row("OA4XYZ");
        incoming.expires_at = Some(instant(2026, 1, 1));

        let plan = reconcile(
            &[incoming],
            &[existing],
            &options(Some(instant(2025, 6, 1)), AbsenceScope::None),
        );

        assert_eq!(plan.counts.updated, 1);
        assert_eq!(plan.upserts[0].expires_at, Some(instant(2026, 1, 1)));
        assert!(plan.upserts[0].enabled);
    }

    #[test]
    fn absent_expiration_never_beats_present_one() {
        let mut existing = record("OA4XYZ");
        existing.expires_at = Some(instant(2026, 1, 1));
        existing.updated_at = instant(2023, 1, 1);

        let mut incoming = row("OA4XYZ");
        incoming.expires_at = None;

        let plan = reconcile(
            &[incoming],
            &[existing],
            &options(Some(instant(2025, 6, 1)), AbsenceScope::None),
        );

        // Losing the expiration is still a tracked-field difference.
        assert_eq!(plan.counts.updated, 1);
    }

    #[test]
    fn descriptive_change_updates_when_batch_is_fresh() {
        let mut existing = record("OA4XYZ");
        existing.updated_at = instant(2024, 1, 1);

        let mut incoming = row("OA4XYZ");
        incoming.category = "SUPERIOR".to_string();

        let plan = reconcile(
            &[incoming],
            &[existing],
            &options(Some(instant(2025, 6, 1)), AbsenceScope::None),
        );

        assert_eq!(plan.counts.updated, 1);
        assert_eq!(plan.upserts[0].category, "SUPERIOR");
    }

    #[test]
    fn fresh_expiration_protects_absent_record_from_disabling() {
        let mut existing = record("OA9ABC");
        existing.expires_at = Some(instant(2026, 12, 31));
        existing.updated_at = instant(2024, 6, 1);
        let before = existing.enabled;

        let plan = reconcile(
            &[],
            &[existing.clone()],
            &options(
                Some(instant(2025, 8, 1)),
                AbsenceScope::CallsignPrefix("OA".to_string()),
            ),
        );

        assert_eq!(plan.counts.protected, 1);
        assert_eq!(plan.counts.disabled, 0);
        assert!(plan.upserts.is_empty());
        assert_eq!(existing.enabled, before);
    }

    #[test]
    fn local_freshness_protects_absent_record_from_disabling() {
        let mut existing = record("OA9ABC");
        existing.updated_at = instant(2025, 9, 1);

        let plan = reconcile(
            &[],
            &[existing],
            &options(
                Some(instant(2025, 8, 1)),
                AbsenceScope::CallsignPrefix("OA".to_string()),
            ),
        );

        assert_eq!(plan.counts.protected, 1);
        assert_eq!(plan.counts.disabled, 0);
    }

    #[test]
    fn batch_without_cutoff_disables_nothing() {
        let mut existing = record("OA9ABC");
        existing.expires_at = Some(instant(2020, 1, 1));
        existing.updated_at = instant(2020, 6, 1);

        let plan = reconcile(
            &[],
            &[existing],
            &options(None, AbsenceScope::CallsignPrefix("OA".to_string())),
        );

        assert_eq!(plan.counts.disabled, 0);
        assert_eq!(plan.counts.protected, 1);
    }

    #[test]
    fn absence_pass_never_touches_records_outside_scope() {
        let mut chilean = record("CA3ABC");
        chilean.country = "CHL".to_string();
        chilean.updated_at = instant(2020, 1, 1);

        let plan = reconcile(
            &[],
            &[chilean],
            &options(
                Some(instant(2025, 8, 1)),
                AbsenceScope::CallsignPrefix("OA".to_string()),
            ),
        );

        assert!(plan.upserts.is_empty());
        assert_eq!(plan.counts.disabled + plan.counts.protected, 0);
    }

    #[test]
    fn country_scope_matches_stored_country() {
        let mut chilean = record("CA3ABC");
        chilean.country = "CHL".to_string();
        chilean.updated_at = instant(2020, 1, 1);
        let mut peruvian = record("OA4AAA");
        peruvian.updated_at = instant(2020, 1, 1);

        let plan = reconcile(
            &[],
            &[chilean, peruvian],
            &options(
                Some(instant(2025, 8, 1)),
                AbsenceScope::Country("CHL".to_string()),
            ),
        );

        assert_eq!(plan.counts.disabled, 1);
        assert_eq!(plan.upserts[0].callsign, "CA3ABC");
    }

    #[test]
    fn already_disabled_records_are_skipped_by_the_absence_pass() {
        let mut existing = record("OA9ABC");
        existing.enabled = false;
        existing.updated_at = instant(2020, 1, 1);

        let plan = reconcile(
            &[],
            &[existing],
            &options(
                Some(instant(2025, 8, 1)),
                AbsenceScope::CallsignPrefix("OA".to_string()),
            ),
        );

        assert!(plan.upserts.is_empty());
        assert_eq!(plan.counts.disabled + plan.counts.protected, 0);
    }

    #[test]
    fn counters_partition_the_incoming_batch() {
        let new_row = row("OA1NEW");

        let mut unchanged_existing = record("OA2SAME");
        unchanged_existing.updated_at = instant(2024, 1, 1);
        let mut unchanged_row = row("OA2SAME");
        unchanged_row.name = unchanged_existing.name.clone();

        let mut updated_existing = record("OA3UPD");
        updated_existing.updated_at = instant(2024, 1, 1);
        let mut updated_row = row("OA3UPD");
        updated_row.name = "NUEVO NOMBRE".to_string();

        let mut reenabled_existing = record("OA4RE");
        reenabled_existing.enabled = false;
        reenabled_existing.updated_at = instant(2024, 1, 1);
        let reenabled_row = row("OA4RE");

        let plan = reconcile(
            &[new_row, unchanged_row, updated_row, reenabled_row],
            &[unchanged_existing, updated_existing, reenabled_existing],
            &options(Some(instant(2025, 6, 1)), AbsenceScope::None),
        );

        let counts = plan.counts;
        assert_eq!(counts.total, 4);
        assert_eq!(
            counts.new + counts.updated + counts.unchanged + counts.reenabled,
            counts.total
        );
        assert_eq!(counts.new, 1);
        assert_eq!(counts.updated, 1);
        assert_eq!(counts.unchanged, 1);
        assert_eq!(counts.reenabled, 1);
    }

    #[test]
    fn engine_dedupes_by_latest_expiration() {
        let mut early = row("OA4XYZ");
        early.expires_at = Some(instant(2025, 1, 1));
        let mut late = row("OA4XYZ");
        late.expires_at = Some(instant(2027, 1, 1));
        let mut none = row("OA4XYZ");
        none.expires_at = None;

        let plan = reconcile(
            &[early, late, none],
            &[],
            &options(Some(instant(2025, 6, 1)), AbsenceScope::None),
        );

        assert_eq!(plan.counts.total, 1);
        assert_eq!(plan.counts.new, 1);
        assert_eq!(plan.upserts[0].expires_at, Some(instant(2027, 1, 1)));
    }

    #[test]
    fn csv_row_updated_at_is_used_for_the_write_stamp() {
        let mut incoming = row("OA4XYZ");
        incoming.updated_at = Some(instant(2025, 3, 3));

        let plan = reconcile(
            &[incoming],
            &[],
            &options(None, AbsenceScope::None),
        );

        assert_eq!(plan.upserts[0].updated_at, instant(2025, 3, 3));
    }

    #[test]
    fn explicitly_disabled_incoming_row_disables_existing_record() {
        let mut existing = record("OA4XYZ");
        existing.updated_at = instant(2024, 1, 1);

        let mut incoming = row("OA4XYZ");
        incoming.enabled = false;

        let plan = reconcile(
            &[incoming],
            &[existing],
            &options(None, AbsenceScope::None),
        );

        assert_eq!(plan.counts.updated, 1);
        assert!(!plan.upserts[0].enabled);
    }
}
