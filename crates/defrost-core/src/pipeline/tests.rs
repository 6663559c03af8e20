use super::*;
use crate::{
    entity::{Entity, PathElement, PropertyValue, Value, encode::encode},
    sink::MemorySink,
    test_support::{ShardFileBuilder, corrupt_byte},
    translate::{FieldMapping, KindMapping, TranslatedRecord},
};
use std::{collections::BTreeMap, fs, path::PathBuf};
use tempfile::TempDir;

fn order(id: i64, total: i64) -> Entity {
    Entity {
        key_path: vec![PathElement::with_id("Order", id)],
        properties: [(
            "total".to_string(),
            PropertyValue::single(Value::Integer(total), true),
        )]
        .into_iter()
        .collect::<BTreeMap<_, _>>(),
    }
}

fn customer(name: &str) -> Entity {
    Entity {
        key_path: vec![PathElement::with_name("Customer", name)],
        properties: BTreeMap::new(),
    }
}

fn write_shard(dir: &TempDir, name: &str, payloads: &[Vec<u8>]) -> PathBuf {
    let mut builder = ShardFileBuilder::new();
    for payload in payloads {
        builder.add_record(payload);
    }
    let path = dir.path().join(name);
    fs::write(&path, builder.build()).unwrap();

    path
}

fn write_manifest(dir: &TempDir, kinds: &[(&str, &[&str], u64)]) -> PathBuf {
    let kinds: Vec<serde_json::Value> = kinds
        .iter()
        .map(|(name, files, count)| {
            serde_json::json!({ "name": name, "files": files, "entity_count": count })
        })
        .collect();
    let doc = serde_json::json!({
        "export_id": "exp-test",
        "format_version": 1,
        "kinds": kinds,
    });
    let path = dir.path().join("manifest.json");
    fs::write(&path, doc.to_string()).unwrap();

    path
}

fn run_to_report(
    manifest_path: &PathBuf,
    config: &PipelineConfig,
) -> (ValidationReport, MemorySink) {
    let mut sink = MemorySink::new();
    let report = run_export(manifest_path, config, &mut sink, &CancelToken::new()).unwrap();

    (report, sink)
}

#[test]
fn end_to_end_clean_run() {
    let dir = tempfile::tempdir().unwrap();
    write_shard(&dir, "order-0", &[encode(&order(1, 10)), encode(&order(2, 20))]);
    write_shard(&dir, "order-1", &[encode(&order(3, 30))]);
    write_shard(&dir, "customer-0", &[encode(&customer("acme"))]);
    let manifest = write_manifest(
        &dir,
        &[
            ("Order", &["order-0", "order-1"], 3),
            ("Customer", &["customer-0"], 1),
        ],
    );

    let config = PipelineConfig {
        workers: 2,
        ..PipelineConfig::default()
    };
    let (report, sink) = run_to_report(&manifest, &config);

    assert!(report.clean);
    assert_eq!(report.kinds[0].decoded_count, 3);
    assert_eq!(report.kinds[0].translated_count, 3);
    assert_eq!(report.kinds[1].decoded_count, 1);
    assert_eq!(sink.records.len(), 4);
    // Provenance points back into the shard files the manifest named.
    assert!(
        sink.records
            .iter()
            .all(|record| record.shard.ends_with("order-0")
                || record.shard.ends_with("order-1")
                || record.shard.ends_with("customer-0"))
    );
}

#[test]
fn decode_error_yields_shortfall_and_anomaly() {
    // Manifest declares five Order entities across two shards; one
    // record is garbage, so four decode.
    let dir = tempfile::tempdir().unwrap();
    write_shard(
        &dir,
        "order-0",
        &[encode(&order(1, 1)), vec![0xff], encode(&order(2, 2))],
    );
    write_shard(&dir, "order-1", &[encode(&order(3, 3)), encode(&order(4, 4))]);
    let manifest = write_manifest(&dir, &[("Order", &["order-0", "order-1"], 5)]);

    let (report, sink) = run_to_report(&manifest, &PipelineConfig::default());

    assert!(!report.clean);
    let kind = &report.kinds[0];
    assert_eq!(kind.expected_count, 5);
    assert_eq!(kind.decoded_count, 4);
    assert_eq!(kind.translated_count, 4);
    assert_eq!(sink.records.len(), 4);

    let kinds: Vec<AnomalyKind> = kind.anomalies.iter().map(|a| a.kind).collect();
    assert!(kinds.contains(&AnomalyKind::Decode));
    assert!(kinds.contains(&AnomalyKind::CountMismatch));
}

#[test]
fn corruption_is_contained_to_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let payloads = vec![
        encode(&order(1, 1)),
        encode(&order(2, 2)),
        encode(&order(3, 3)),
    ];

    let mut builder = ShardFileBuilder::new();
    builder.add_record(&payloads[0]);
    let second_offset = builder.next_offset();
    builder.add_record(&payloads[1]);
    builder.pad_to_block_end();
    builder.add_record(&payloads[2]);
    let mut shard = builder.build();
    corrupt_byte(
        &mut shard,
        usize::try_from(second_offset).unwrap() + crate::log::HEADER_SIZE,
    );
    fs::write(dir.path().join("order-0"), shard).unwrap();
    let manifest = write_manifest(&dir, &[("Order", &["order-0"], 3)]);

    let (report, sink) = run_to_report(&manifest, &PipelineConfig::default());

    let kind = &report.kinds[0];
    assert_eq!(kind.decoded_count, 2);
    assert_eq!(sink.records.len(), 2);
    assert!(
        kind.anomalies
            .iter()
            .any(|anomaly| anomaly.kind == AnomalyKind::Framing
                && anomaly.offset == second_offset)
    );
}

#[test]
fn mismatched_kind_is_a_schema_violation() {
    // A Customer entity sits in a shard the manifest assigns to Order.
    let dir = tempfile::tempdir().unwrap();
    write_shard(
        &dir,
        "order-0",
        &[encode(&order(1, 1)), encode(&customer("acme"))],
    );
    let manifest = write_manifest(&dir, &[("Order", &["order-0"], 2)]);

    let (report, sink) = run_to_report(&manifest, &PipelineConfig::default());

    assert!(!report.clean);
    let kind = &report.kinds[0];
    assert_eq!(kind.decoded_count, 2);
    assert!(
        kind.anomalies
            .iter()
            .any(|anomaly| anomaly.kind == AnomalyKind::SchemaViolation)
    );
    // The stray entity still translates, under its own kind.
    assert_eq!(sink.records.len(), 2);
    assert!(sink.records.iter().any(|record| record.kind == "Customer"));
}

#[test]
fn include_list_restricts_translation() {
    let dir = tempfile::tempdir().unwrap();
    write_shard(&dir, "order-0", &[encode(&order(1, 1))]);
    write_shard(&dir, "customer-0", &[encode(&customer("acme"))]);
    let manifest = write_manifest(
        &dir,
        &[("Order", &["order-0"], 1), ("Customer", &["customer-0"], 1)],
    );

    let config = PipelineConfig {
        include_kinds: vec!["Order".into()],
        ..PipelineConfig::default()
    };
    let (report, sink) = run_to_report(&manifest, &config);

    // Filtering affects translation, not decode accounting.
    assert!(report.clean);
    assert_eq!(report.kinds[1].decoded_count, 1);
    assert_eq!(report.kinds[1].translated_count, 0);
    assert_eq!(sink.records.len(), 1);
    assert_eq!(sink.records[0].kind, "Order");
}

#[test]
fn excluded_kind_is_decoded_but_not_translated() {
    let dir = tempfile::tempdir().unwrap();
    write_shard(&dir, "customer-0", &[encode(&customer("acme"))]);
    let manifest = write_manifest(&dir, &[("Customer", &["customer-0"], 1)]);

    let config = PipelineConfig {
        exclude_kinds: vec!["Customer".into()],
        ..PipelineConfig::default()
    };
    let (report, sink) = run_to_report(&manifest, &config);

    assert!(report.clean);
    assert_eq!(report.kinds[0].decoded_count, 1);
    assert_eq!(report.kinds[0].translated_count, 0);
    assert!(sink.records.is_empty());
}

#[test]
fn mapping_error_drops_record_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    write_shard(&dir, "order-0", &[encode(&order(1, 1)), encode(&order(2, 2))]);
    let manifest = write_manifest(&dir, &[("Order", &["order-0"], 2)]);

    let config = PipelineConfig {
        mappings: MappingTable::new().kind(
            "Order",
            KindMapping::new().field("absent", FieldMapping::renamed("needed").required()),
        ),
        ..PipelineConfig::default()
    };
    let (report, sink) = run_to_report(&manifest, &config);

    assert!(!report.clean);
    assert!(sink.records.is_empty());
    assert_eq!(report.kinds[0].decoded_count, 2);
    assert_eq!(report.kinds[0].translated_count, 0);
    assert_eq!(
        report.kinds[0]
            .anomalies
            .iter()
            .filter(|anomaly| anomaly.kind == AnomalyKind::Mapping)
            .count(),
        2
    );
}

#[test]
fn strict_mapping_escalates_to_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_shard(&dir, "order-0", &[encode(&order(1, 1))]);
    let manifest = write_manifest(&dir, &[("Order", &["order-0"], 1)]);

    let config = PipelineConfig {
        strict_mapping: true,
        mappings: MappingTable::new().kind(
            "Order",
            KindMapping::new().field("absent", FieldMapping::renamed("needed").required()),
        ),
        ..PipelineConfig::default()
    };

    let mut sink = MemorySink::new();
    let err = run_export(&manifest, &config, &mut sink, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, PipelineError::Mapping { .. }));
}

#[test]
fn unreadable_shard_aborts_only_that_shard() {
    let dir = tempfile::tempdir().unwrap();
    // A directory satisfies manifest resolution but fails on read.
    fs::create_dir(dir.path().join("order-0")).unwrap();
    write_shard(&dir, "customer-0", &[encode(&customer("acme"))]);
    let manifest = write_manifest(
        &dir,
        &[("Order", &["order-0"], 1), ("Customer", &["customer-0"], 1)],
    );

    let (report, _sink) = run_to_report(&manifest, &PipelineConfig::default());

    assert!(!report.clean);
    let order_kind = &report.kinds[0];
    assert_eq!(order_kind.unprocessed_shards.len(), 1);
    assert!(
        order_kind
            .anomalies
            .iter()
            .any(|anomaly| anomaly.kind == AnomalyKind::ShardIo)
    );
    // The abandoned shard explains the shortfall; no double report.
    assert!(
        order_kind
            .anomalies
            .iter()
            .all(|anomaly| anomaly.kind != AnomalyKind::CountMismatch)
    );
    // The healthy kind is unaffected.
    assert!(report.kinds[1].is_clean());
}

#[test]
fn fail_fast_escalates_framing_errors() {
    let dir = tempfile::tempdir().unwrap();
    let mut builder = ShardFileBuilder::new();
    builder.add_record(&encode(&order(1, 1)));
    let mut shard = builder.build();
    corrupt_byte(&mut shard, crate::log::HEADER_SIZE);
    fs::write(dir.path().join("order-0"), shard).unwrap();
    let manifest = write_manifest(&dir, &[("Order", &["order-0"], 1)]);

    let config = PipelineConfig {
        fail_fast: true,
        ..PipelineConfig::default()
    };
    let mut sink = MemorySink::new();
    let err = run_export(&manifest, &config, &mut sink, &CancelToken::new()).unwrap_err();

    assert!(matches!(err, PipelineError::Framing { offset: 0, .. }));
}

#[test]
fn fail_fast_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("order-0")).unwrap();
    let manifest = write_manifest(&dir, &[("Order", &["order-0"], 1)]);

    let config = PipelineConfig {
        fail_fast: true,
        ..PipelineConfig::default()
    };
    let mut sink = MemorySink::new();
    let err = run_export(&manifest, &config, &mut sink, &CancelToken::new()).unwrap_err();

    assert!(matches!(err, PipelineError::Shard { .. }));
}

#[test]
fn cancelled_run_reports_cancellation_not_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    write_shard(&dir, "order-0", &[encode(&order(1, 1))]);
    let manifest_path = write_manifest(&dir, &[("Order", &["order-0"], 1)]);

    let cancel = CancelToken::new();
    cancel.cancel();
    let mut sink = MemorySink::new();
    let report =
        run_export(&manifest_path, &PipelineConfig::default(), &mut sink, &cancel).unwrap();

    assert!(!report.clean);
    assert!(sink.records.is_empty());
    let kind = &report.kinds[0];
    assert_eq!(kind.unprocessed_shards.len(), 1);
    assert!(
        kind.anomalies
            .iter()
            .any(|anomaly| anomaly.kind == AnomalyKind::Cancelled)
    );
    assert!(
        kind.anomalies
            .iter()
            .all(|anomaly| anomaly.kind != AnomalyKind::CountMismatch)
    );
}

// Sink that cancels the run once it has accepted one record, so the
// worker hits the between-records cancellation check mid-shard.
struct CancelAfterFirst {
    records: Vec<TranslatedRecord>,
    cancel: CancelToken,
}

impl RecordSink for CancelAfterFirst {
    fn accept(&mut self, record: TranslatedRecord) -> std::io::Result<()> {
        self.records.push(record);
        self.cancel.cancel();

        Ok(())
    }
}

#[test]
fn cancellation_mid_shard_stops_after_current_record() {
    let dir = tempfile::tempdir().unwrap();
    write_shard(&dir, "order-0", &[encode(&order(1, 1)), encode(&order(2, 2))]);
    let manifest = write_manifest(&dir, &[("Order", &["order-0"], 2)]);

    let cancel = CancelToken::new();
    let mut sink = CancelAfterFirst {
        records: Vec::new(),
        cancel: cancel.clone(),
    };
    let config = PipelineConfig {
        workers: 1,
        ..PipelineConfig::default()
    };
    let report = run_export(&manifest, &config, &mut sink, &cancel).unwrap();

    // The first record made it through; the shard was then abandoned.
    assert!(!report.clean);
    assert_eq!(sink.records.len(), 1);
    let kind = &report.kinds[0];
    assert_eq!(kind.translated_count, 1);
    assert_eq!(kind.unprocessed_shards.len(), 1);
    assert!(
        kind.anomalies
            .iter()
            .any(|anomaly| anomaly.kind == AnomalyKind::Cancelled)
    );
    assert!(
        kind.anomalies
            .iter()
            .all(|anomaly| anomaly.kind != AnomalyKind::CountMismatch)
    );
}

#[test]
fn reruns_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    write_shard(
        &dir,
        "order-0",
        &[encode(&order(1, 1)), vec![0xff], encode(&order(2, 2))],
    );
    let manifest = write_manifest(&dir, &[("Order", &["order-0"], 3)]);

    let config = PipelineConfig {
        workers: 1,
        ..PipelineConfig::default()
    };
    let (report_a, sink_a) = run_to_report(&manifest, &config);
    let (report_b, sink_b) = run_to_report(&manifest, &config);

    assert_eq!(
        serde_json::to_string(&report_a).unwrap(),
        serde_json::to_string(&report_b).unwrap()
    );
    assert_eq!(sink_a.records, sink_b.records);
}
