//! Integration tests for the chunking pipeline

use chunkspace::{BoundaryDetector, ChunkStats, ChunkType, Chunker, DocumentStructure, TokenEstimator};

/// A markdown document large enough to need chunking at small budgets.
fn markdown_document() -> String {
    let mut text = String::new();
    text.push_str("# Release Notes\n\nThis document walks through the changes.\n\n");
    for section in 0..12 {
        text.push_str(&format!("## Section {section}\n\n"));
        for sentence in 0..6 {
            text.push_str(&format!(
                "Change {sentence} in section {section} adjusts the pipeline behavior. "
            ));
        }
        text.push_str("\n\n");
    }
    text.push_str("```rust\nfn apply() {\n    run();\n}\n```\n\n");
    text.push_str("- first item\n- second item\n- third item\n- fourth item\n\nClosing words.\n");
    text
}

#[test]
fn text_under_budget_is_returned_whole() {
    let chunker = Chunker::with_limits(4000, 200);
    let text = markdown_document();
    let chunks = chunker.chunk(&text);

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, text);
    assert_eq!(chunks[0].index, 1);
    assert_eq!(chunks[0].end, text.len());
}

#[test]
fn chunks_cover_document_in_order() {
    let chunker = Chunker::with_limits(60, 12);
    let text = markdown_document();
    let chunks = chunker.chunk(&text);

    assert!(chunks.len() > 1);
    assert_eq!(chunks[0].start, 0);
    assert_eq!(chunks.last().unwrap().end, text.len());

    for pair in chunks.windows(2) {
        assert!(pair[0].start <= pair[1].start, "chunks out of order");
        assert!(pair[1].start <= pair[0].end, "coverage gap between chunks");
    }
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.index, i + 1);
        assert_eq!(chunk.content, &text[chunk.start..chunk.end]);
    }
}

#[test]
fn chunking_is_deterministic_across_runs() {
    let chunker = Chunker::with_limits(60, 12);
    let text = markdown_document();
    assert_eq!(chunker.chunk(&text), chunker.chunk(&text));
}

#[test]
fn code_block_within_tolerance_is_never_split() {
    let chunker = Chunker::with_limits(40, 8);
    // Code block between 40 and 60 tokens (1.5x tolerance)
    let code_body = (0..14)
        .map(|i| format!("step_{i}();"))
        .collect::<Vec<_>>()
        .join("\n");
    let code = format!("```python\n{code_body}\n```");
    let prose: String = (0..30)
        .map(|i| format!("Sentence number {i} provides context.\n\n"))
        .collect();
    let text = format!("{prose}{code}\n\n{prose}");

    let chunker_estimate = chunker.count(&code);
    assert!(chunker_estimate > 40 && chunker_estimate <= 60);

    let chunks = chunker.chunk(&text);
    let containing: Vec<_> = chunks
        .iter()
        .filter(|c| c.content.contains("step_0();"))
        .collect();
    assert_eq!(containing.len(), 1);
    assert_eq!(containing[0].content, code);
    assert_eq!(containing[0].kind, ChunkType::Code);
}

#[test]
fn estimator_threshold_example() {
    let estimator = TokenEstimator::approximate(3.5);
    let text = "a".repeat(27700);
    assert_eq!(estimator.estimate_fast(&text), 7914);
    assert!(estimator.needs_chunking(&text, 6000));
}

#[test]
fn structure_analysis_example() {
    let structure = DocumentStructure::analyze("# Title\n\nIntro.\n\n```python\ncode\n```\n");
    assert_eq!(structure.heading_count, 1);
    assert_eq!(structure.code_blocks, 1);
    assert!(structure
        .code_languages
        .iter()
        .any(|lang| lang == "python"));
}

#[test]
fn structure_feeds_chunking_decision() {
    let text = markdown_document();
    let structure = DocumentStructure::analyze(&text);
    let estimator = TokenEstimator::approximate(3.5);

    // The analyzer's fast token estimate matches the estimator's
    assert_eq!(structure.total_tokens, estimator.estimate_fast(&text));

    let chunker = Chunker::with_limits(60, 12);
    let (was_chunked, chunks) = chunker.chunk_for_processing(&text, 100);
    assert!(was_chunked);
    let stats = ChunkStats::from_chunks(&chunks);
    assert_eq!(stats.chunk_count, chunks.len());
    assert!(stats.max_tokens <= 60);
}

#[test]
fn boundary_detection_orders_all_kinds() {
    let text = markdown_document();
    let boundaries = BoundaryDetector::find_boundaries(&text);
    assert!(!boundaries.is_empty());
    assert!(boundaries
        .windows(2)
        .all(|pair| pair[0].position <= pair[1].position));
}

#[test]
fn pathological_inputs_never_panic() {
    let chunker = Chunker::with_limits(50, 10);
    for text in [
        "",
        " ",
        "\n\n\n\n",
        "```",
        "``` unterminated fence\ncode",
        "####### seven hashes is not a heading",
        "ä",
    ] {
        let chunks = chunker.chunk(text);
        if !text.is_empty() {
            assert_eq!(chunks.last().unwrap().end, text.len());
        }
    }

    // Very long single-word input degrades to hard cuts
    let wall = "ü".repeat(5000);
    let chunks = chunker.chunk(&wall);
    assert!(chunks.len() > 1);
    assert_eq!(chunks.last().unwrap().end, wall.len());
}
