use feruca::{Collator, Locale, Tailoring};

use crate::store::{FilterCriteria, ImageRecord, SortKey};

/// Apply search, tag and sort stages of `criteria` to `records`.
///
/// Sorting is stable, so records that compare equal keep their storage order.
pub fn filter_records<'a, I>(records: I, criteria: &FilterCriteria) -> Vec<&'a ImageRecord>
where
    I: IntoIterator<Item = &'a ImageRecord>,
{
    let term = criteria.search_term.to_lowercase();
    let mut matched: Vec<&ImageRecord> = records
        .into_iter()
        .filter(|record| term.is_empty() || matches_search(record, &term))
        .filter(|record| has_all_tags(record, &criteria.selected_tags))
        .collect();

    match criteria.sort_by {
        SortKey::Newest => matched.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortKey::Oldest => matched.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        SortKey::Name => {
            let mut collator = name_collator();
            matched.sort_by(|a, b| collator.collate(a.file_name.as_str(), b.file_name.as_str()));
        }
    }
    matched
}

/// `term` must already be lower-cased.
fn matches_search(record: &ImageRecord, term: &str) -> bool {
    record.positive_prompt.to_lowercase().contains(term)
        || record.negative_prompt.to_lowercase().contains(term)
        || record.model.to_lowercase().contains(term)
        || record.tags.iter().any(|tag| tag.to_lowercase().contains(term))
}

fn has_all_tags(record: &ImageRecord, required: &[String]) -> bool {
    required.iter().all(|tag| record.tags.contains(tag))
}

/// Unicode collation with the CLDR root order. Punctuation is not ignorable,
/// so `img_1` sorts before `img1` as it does in ICU.
pub fn name_collator() -> Collator {
    Collator::new(Tailoring::Cldr(Locale::Root), false, true)
}
