use forma_storage::value;
use serde_json::Value;

use crate::search::SearchEntry;

pub const DEFAULT_ADD_HITS: u32 = 9;
pub const DEFAULT_WEIGHTING: u32 = 9999;

/// Zero-padded `addHits`, `searchImportance`, `weighting` and text. Lower keys rank first.
pub fn ranking_key(entry: &SearchEntry) -> String {
	format!(
		"{:01}{:02}{:04}{}",
		entry.add_hits, entry.search_importance, entry.weighting, entry.text
	)
}

/// Inserts before the first entry whose key is not lower.
pub(super) fn insert_sorted(results: &mut Vec<SearchEntry>, entry: SearchEntry) {
	let key = ranking_key(&entry);
	let position = results.partition_point(|existing| ranking_key(existing) < key);

	results.insert(position, entry);
}

/// Records a hit for `id`. A repeated id loses one `addHits`, floored at 1, and moves to its new
/// position. A new id gets the entry built by `build`.
pub(super) fn merge_hit<F>(results: &mut Vec<SearchEntry>, id: &Value, build: F)
where
	F: FnOnce() -> SearchEntry,
{
	let id = value::id_string(id);

	match results.iter().rposition(|entry| value::id_string(&entry.id) == id) {
		Some(position) => {
			let mut entry = results.remove(position);

			entry.add_hits = entry.add_hits.saturating_sub(1).max(1);

			insert_sorted(results, entry);
		},
		None => insert_sorted(results, build()),
	}
}

#[cfg(test)]
mod tests {
	use serde_json::{Map, json};

	use super::*;

	fn entry(id: &str, text: &str, importance: u32) -> SearchEntry {
		SearchEntry {
			id: json!(id),
			text: text.to_string(),
			weighting: DEFAULT_WEIGHTING,
			search_importance: importance,
			add_hits: DEFAULT_ADD_HITS,
			resource: None,
			resource_text: None,
			extra: Map::new(),
		}
	}

	#[test]
	fn ranking_key_pads_each_component() {
		assert_eq!(ranking_key(&entry("1", "Jo", 2)), "9029999Jo");

		let mut weighted = entry("1", "Al", 99);

		weighted.weighting = 5;
		weighted.add_hits = 1;

		assert_eq!(ranking_key(&weighted), "1990005Al");
	}

	#[test]
	fn entries_stay_sorted_by_key() {
		let mut results = Vec::new();

		insert_sorted(&mut results, entry("a", "Zed", 1));
		insert_sorted(&mut results, entry("b", "Amy", 2));
		insert_sorted(&mut results, entry("c", "Bob", 1));

		let texts: Vec<&str> = results.iter().map(|entry| entry.text.as_str()).collect();

		assert_eq!(texts, vec!["Bob", "Zed", "Amy"]);
	}

	#[test]
	fn repeated_hits_lose_one_add_hit_and_move_up() {
		let mut results = Vec::new();

		merge_hit(&mut results, &json!("a"), || entry("a", "Amy", 1));
		merge_hit(&mut results, &json!("b"), || entry("b", "Zed", 1));
		merge_hit(&mut results, &json!("b"), || panic!("Existing entry must be reused."));

		assert_eq!(results.len(), 2);
		assert_eq!(results[0].text, "Zed");
		assert_eq!(results[0].add_hits, 8);
		assert_eq!(results[1].add_hits, 9);
	}

	#[test]
	fn add_hits_floor_at_one() {
		let mut results = vec![entry("a", "Amy", 1)];

		for _ in 0..12 {
			merge_hit(&mut results, &json!("a"), || panic!("Existing entry must be reused."));
		}

		assert_eq!(results.len(), 1);
		assert_eq!(results[0].add_hits, 1);
	}
}
