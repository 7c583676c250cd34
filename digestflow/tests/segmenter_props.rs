//! Segmentation properties over generated text.

use digestflow::fetch::SourceResult;
use digestflow::segment::{segment_sources, segment_text, split_paragraph_aware};
use digestflow::testing::paragraph_text;
use pretty_assertions::assert_eq;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[test]
fn test_million_chars_with_regular_breaks_yields_three_clean_segments() {
    let text = paragraph_text(1_000_000, 2_000);
    let split = split_paragraph_aware(&text, 400_000);

    assert_eq!(split.pieces.len(), 3);
    assert_eq!(split.forced_cuts, 0);
    assert_eq!(split.pieces.concat(), text);
}

#[test]
fn test_every_piece_is_bounded_and_partition_is_lossless() {
    let samples = [
        paragraph_text(10_000, 120),
        paragraph_text(10_000, 5_000),
        paragraph_text(10_000, 50_000),
        "ünïcödé ".repeat(900),
        "a\n\nb\n\n\n\nc".repeat(200),
    ];

    for text in &samples {
        for max in [1, 7, 64, 999, 4_096] {
            let pieces = segment_text(text, max);
            assert!(
                pieces.iter().all(|p| char_len(p) <= max),
                "piece over {max} chars"
            );
            assert!(pieces.iter().all(|p| !p.is_empty()));
            assert_eq!(pieces.concat(), *text);
        }
    }
}

#[test]
fn test_undersized_text_is_returned_whole() {
    for text in ["", "x", "one\n\ntwo", &paragraph_text(400, 50)] {
        let pieces = segment_text(text, 400);
        if text.is_empty() {
            assert!(pieces.is_empty());
        } else {
            assert_eq!(pieces, vec![text]);
        }
    }
}

#[test]
fn test_resegmenting_pieces_is_idempotent() {
    let text = paragraph_text(50_000, 700);
    for piece in segment_text(&text, 4_000) {
        assert_eq!(segment_text(piece, 4_000), vec![piece]);
    }
}

#[test]
fn test_sources_keep_order_and_provenance() {
    let results = vec![
        SourceResult::success("https://a.example", paragraph_text(2_500, 300)),
        SourceResult::success("https://b.example", "short"),
    ];
    let segmented = segment_sources(&results, 1_000);

    let ids: Vec<&str> = segmented
        .segments
        .iter()
        .map(|s| s.source_id.as_str())
        .collect();
    assert_eq!(
        ids,
        vec![
            "https://a.example",
            "https://a.example",
            "https://a.example",
            "https://b.example"
        ]
    );
    let rebuilt: String = segmented.segments[..3].iter().map(|s| s.text.as_str()).collect();
    assert_eq!(rebuilt, results[0].content);
}
