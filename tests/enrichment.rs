use approx::assert_abs_diff_eq;
use ndarray::Array2;
use sspa::enrich::{
    DifferentialTest, EnrichmentError, GseaOptions, OraAnalysis, benjamini_hochberg,
    differential_test, gsea, ora,
};
use sspa::pathways::{PathwayDict, PathwayEntry};
use sspa::{AbundanceMatrix, AnalysisMethod, RankMethod, RankOptions, ScoringOptions, run_analysis};

const LABELS: [&str; 8] = ["CASE", "CASE", "CASE", "CASE", "CTRL", "CTRL", "CTRL", "CTRL"];

// e0..e2 are raised in CASE, e3..e5 in CTRL, the rest is low-amplitude noise.
fn two_class_matrix() -> AbundanceMatrix {
    let values = Array2::from_shape_fn((8, 12), |(i, j)| {
        let case = i < 4;
        let shift = match (case, j) {
            (true, 0..=2) => 3.0,
            (false, 3..=5) => 3.0,
            _ => 0.0,
        };
        shift + ((i * 7 + j * 3) % 5) as f64 * 0.3
    });
    AbundanceMatrix::new(
        (0..8).map(|i| format!("s{i}")).collect(),
        (0..12).map(|j| format!("e{j}")).collect(),
        values,
    )
    .unwrap()
}

fn pathways() -> PathwayDict {
    PathwayDict::from_entries(vec![
        PathwayEntry::new("up", Some("Raised in cases".to_string()), ["e0", "e1", "e2"]),
        PathwayEntry::new("down", None, ["e3", "e4", "e5", "e6"]),
        PathwayEntry::new("noise", None, ["e7", "e8", "e9"]),
        PathwayEntry::new("absent", None, ["z1", "z2"]),
    ])
}

#[test]
fn ora_contingency_matches_hypergeometric_tail() {
    let background: Vec<String> = (0..10).map(|j| format!("e{j}")).collect();
    let dict = PathwayDict::from_entries(vec![PathwayEntry::new(
        "P",
        Some("four members".to_string()),
        ["e0", "e1", "e2", "e3"],
    )]);
    let records = ora(&["e0", "e1", "e4"], &background, &dict);

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.hits, "2/4");
    assert_eq!(record.coverage, "4/4");
    // P(X >= 2) for N = 10, K = 3, n = 4: (63 + 7) / 210.
    assert_abs_diff_eq!(record.p_value, 1.0 / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(record.p_adjust, record.p_value, epsilon = 1e-12);
}

#[test]
fn ora_without_differential_entities_is_empty() {
    let background: Vec<String> = (0..10).map(|j| format!("e{j}")).collect();
    let records = ora::<&str, String>(&[], &background, &pathways());
    assert!(records.is_empty());
}

#[test]
fn benjamini_hochberg_is_monotone_and_bounded() {
    let raw = [0.04, 0.001, 0.3, 0.02, 0.9, 0.011, 0.5];
    let adjusted = benjamini_hochberg(&raw);

    let mut order: Vec<usize> = (0..raw.len()).collect();
    order.sort_by(|&a, &b| raw[a].total_cmp(&raw[b]));
    for pair in order.windows(2) {
        assert!(adjusted[pair[0]] <= adjusted[pair[1]] + 1e-15);
    }
    for (p, q) in raw.iter().zip(&adjusted) {
        assert!(q >= p && *q <= 1.0);
    }
}

#[test]
fn differential_table_follows_entity_order() {
    let matrix = two_class_matrix();
    for test in [DifferentialTest::TTest, DifferentialTest::MannWhitney] {
        let table = differential_test(&matrix, &LABELS, test).unwrap();
        let entities: Vec<&str> = table.iter().map(|r| r.entity.as_str()).collect();
        assert_eq!(entities, matrix.entity_ids());
        assert!(table.iter().all(|r| r.p_adjust >= r.p_value));
    }
}

#[test]
fn ora_pipeline_finds_the_raised_pathway() {
    let matrix = two_class_matrix();
    let records = OraAnalysis::default()
        .run(&matrix, &LABELS, &pathways())
        .unwrap();

    let up = records.iter().find(|r| r.id == "up").unwrap();
    assert_eq!(up.hits, "3/3");
    assert_eq!(up.name.as_deref(), Some("Raised in cases"));
    assert!(records.iter().all(|r| r.id != "absent"));
}

#[test]
fn three_classes_are_rejected_everywhere() {
    let matrix = two_class_matrix();
    let labels = ["a", "a", "b", "b", "c", "c", "a", "b"];
    assert!(matches!(
        differential_test(&matrix, &labels, DifferentialTest::TTest),
        Err(EnrichmentError::ClassCardinality { found: 3 })
    ));
    assert!(matches!(
        gsea(&matrix, &labels, &pathways(), &GseaOptions::default()),
        Err(EnrichmentError::ClassCardinality { found: 3 })
    ));
}

#[test]
fn label_count_must_match_samples() {
    let matrix = two_class_matrix();
    assert!(matches!(
        differential_test(&matrix, &LABELS[..5], DifferentialTest::TTest),
        Err(EnrichmentError::LabelLength { labels: 5, samples: 8 })
    ));
}

#[test]
fn rank_methods_are_deterministic_and_keep_layout() {
    let matrix = two_class_matrix();
    for method in [RankMethod::Ssgsea, RankMethod::Gsva] {
        let run = || {
            run_analysis(
                &matrix,
                &pathways(),
                AnalysisMethod::Rank(method),
                &ScoringOptions::default(),
                &RankOptions::default(),
            )
            .unwrap()
        };
        let first = run();
        let second = run();

        assert_eq!(first.sample_ids(), matrix.sample_ids(), "{method}");
        assert_eq!(first.pathway_ids(), ["up", "down", "noise"], "{method}");
        for (a, b) in first.values().iter().zip(second.values()) {
            assert_eq!(a.to_bits(), b.to_bits(), "{method}");
        }
    }
}

#[test]
fn gsea_seed_controls_the_null() {
    let matrix = two_class_matrix();
    let options = GseaOptions {
        permutations: 40,
        seed: 7,
        ..GseaOptions::default()
    };
    let first = gsea(&matrix, &LABELS, &pathways(), &options).unwrap();
    let second = gsea(&matrix, &LABELS, &pathways(), &options).unwrap();

    let ids: Vec<&str> = first.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["up", "down", "noise"]);
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.nes.to_bits(), b.nes.to_bits());
        assert_eq!(a.p_value.to_bits(), b.p_value.to_bits());
        assert_eq!(a.fdr.to_bits(), b.fdr.to_bits());
    }
    assert!(first[0].es > 0.0);
    assert!(first[1].es < 0.0);
}
