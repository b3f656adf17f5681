//! Text-unit windows: coarser segmentations built from consecutive sentences.

use std::collections::BTreeMap;

use crate::embedding::VectorStore;
use crate::models::{Sentence, Stance};
use crate::utils::math::{mean_vector, vector_normalize};

/// Units of window `w`: taken from the input when it carries them, otherwise
/// synthesized from the window-1 sentences.
///
/// Synthesized units merge `w` consecutive sentences of one juror (a shorter
/// trailing group is kept): text joined with a space, embedding the
/// L2-normalized mean, stance the majority, id `"{first_id}+w{w}"`.
pub fn units_for_window(store: &VectorStore, window: usize) -> Vec<Sentence> {
    let supplied = store.sentences_for_window(window);
    if !supplied.is_empty() {
        return supplied.into_iter().cloned().collect();
    }
    let base = store.sentences_for_window(1);
    if window <= 1 {
        return base.into_iter().cloned().collect();
    }

    // Group by juror, keeping each juror's sentences in input order.
    let mut by_juror: BTreeMap<&str, Vec<&Sentence>> = BTreeMap::new();
    let mut juror_order: Vec<&str> = Vec::new();
    for s in &base {
        let entry = by_juror.entry(s.juror.as_str()).or_default();
        if entry.is_empty() {
            juror_order.push(s.juror.as_str());
        }
        entry.push(s);
    }

    let mut units = Vec::new();
    for juror in juror_order {
        let Some(sentences) = by_juror.get(juror) else {
            continue;
        };
        for chunk in sentences.chunks(window) {
            units.push(merge_chunk(chunk, window));
        }
    }
    units
}

fn merge_chunk(chunk: &[&Sentence], window: usize) -> Sentence {
    let first = chunk[0];
    if chunk.len() == 1 {
        let mut single = first.clone();
        single.unit_window = window;
        return single;
    }
    let text = chunk
        .iter()
        .map(|s| s.text.trim())
        .collect::<Vec<_>>()
        .join(" ");
    let embedding = mean_vector(chunk.iter().map(|s| s.embedding.as_slice()))
        .map(|m| vector_normalize(&m))
        .unwrap_or_default();
    Sentence {
        id: format!("{}+w{}", first.id, window),
        juror: first.juror.clone(),
        text,
        stance: Stance::majority(chunk.iter().map(|s| s.stance)),
        embedding,
        unit_window: window,
    }
}
