//! Every segment encoding must decode to the same samples

mod helpers;

use std::fs;

use grape_decimator::{Channel, Pipeline, PipelineConfig, RawSegmentReader};
use helpers::Encoding;

#[test]
fn test_all_encodings_read_back_identically() {
    let root = tempfile::tempdir().unwrap();
    let samples = helpers::two_tone_minute(200, 0);
    for (i, enc) in Encoding::ALL.into_iter().enumerate() {
        helpers::write_segment(root.path(), "BPM_10_MHz", i, &samples, enc);
    }

    let reader = RawSegmentReader::new(root.path(), Channel::new("BPM 10 MHz"));
    let segments: Vec<_> = reader.iterate_day(helpers::test_date()).collect();
    assert_eq!(segments.len(), 4);
    for (i, segment) in segments.iter().enumerate() {
        assert_eq!(segment.timestamp, helpers::minute_ts(i));
        assert_eq!(segment.samples.as_deref(), Some(&samples[..]), "{:?}", Encoding::ALL[i]);
        assert!(segment.metadata.is_none());
    }
}

#[test]
fn test_products_independent_of_encoding() {
    let root = tempfile::tempdir().unwrap();
    let dirs = ["CH_raw", "CH_zstd", "CH_lz4", "CH_gzip"];
    for (dir, enc) in dirs.iter().zip(Encoding::ALL) {
        for i in 0..2 {
            let minute = helpers::tones_minute(&[(0.25, 1.0), (3.0, 0.1)], 2_000, i);
            helpers::write_segment(root.path(), dir, i, &minute, enc);
            helpers::write_sidecar(root.path(), dir, i, serde_json::json!({ "sample_rate": 2000 }));
        }
    }

    let pipeline = Pipeline::new(PipelineConfig::new(root.path())).unwrap();
    let report = pipeline.process_day(helpers::test_date(), None).unwrap();
    assert_eq!(report.summaries.len(), 4);
    assert!(report.summaries.iter().all(|s| s.minutes_processed == 2));

    let reference = fs::read(helpers::product_paths(root.path(), "CH_raw").0).unwrap();
    for dir in &dirs[1..] {
        let bin = fs::read(helpers::product_paths(root.path(), dir).0).unwrap();
        assert!(bin == reference, "{dir} differs from raw");
    }
}
