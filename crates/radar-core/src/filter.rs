//! Filter predicate engine.
//!
//! Three dimensions combine with AND; within the tag dimension any selected
//! tag is enough (OR). An empty dimension accepts everything:
//!
//! ```text
//! tagOk  = tags empty  || item.tags ∩ tags ≠ ∅
//! zoneOk = zones empty || zone(item.pos) ∈ zones
//! textOk = text empty  || lowercase(item.name) contains text
//! ```

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::bus::{SceneEvent, SceneObserver};
use crate::derived::Zone;
use crate::item::{Item, ItemId};
use crate::projection::ItemIndex;
use crate::tags::TagSet;

/// Explicit ordering a consumer may ask for instead of cache order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKey {
    Name,
    Distance,
    CreatedOn,
    Zone,
}

/// Sort key plus direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    pub key: SortKey,
    pub ascending: bool,
}

impl SortDescriptor {
    pub fn ascending(key: SortKey) -> Self {
        Self {
            key,
            ascending: true,
        }
    }

    pub fn descending(key: SortKey) -> Self {
        Self {
            key,
            ascending: false,
        }
    }

    fn compare(&self, a: &Item, b: &Item) -> Ordering {
        let ord = match self.key {
            SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortKey::Distance => a
                .distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal),
            SortKey::CreatedOn => a.created_on.cmp(&b.created_on),
            SortKey::Zone => a.zone().cmp(&b.zone()),
        };
        if self.ascending {
            ord
        } else {
            ord.reverse()
        }
    }
}

/// Selection state over tags, zones and a name pattern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemFilter {
    tags: TagSet,
    zones: BTreeSet<Zone>,
    pattern: String,
}

impl ItemFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn zones(&self) -> &BTreeSet<Zone> {
        &self.zones
    }

    pub fn text_pattern(&self) -> &str {
        &self.pattern
    }

    /// True when no dimension restricts anything.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.zones.is_empty() && self.pattern.is_empty()
    }

    pub fn add_tag(&mut self, tag: &str) -> bool {
        self.tags.insert(tag)
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }

    pub fn clear_tags(&mut self) -> bool {
        let changed = !self.tags.is_empty();
        self.tags.clear();
        changed
    }

    pub fn add_zone(&mut self, zone: Zone) -> bool {
        self.zones.insert(zone)
    }

    pub fn remove_zone(&mut self, zone: Zone) -> bool {
        self.zones.remove(&zone)
    }

    pub fn clear_zones(&mut self) -> bool {
        let changed = !self.zones.is_empty();
        self.zones.clear();
        changed
    }

    /// Set the case-insensitive name pattern. Returns whether it changed.
    pub fn set_text_pattern(&mut self, pattern: &str) -> bool {
        let pattern = pattern.to_lowercase();
        if pattern == self.pattern {
            return false;
        }
        self.pattern = pattern;
        true
    }

    pub fn accept(&self, item: &Item) -> bool {
        let tag_ok = self.tags.is_empty() || item.tags.intersects(&self.tags);
        let zone_ok = self.zones.is_empty() || self.zones.contains(&item.zone());
        let text_ok =
            self.pattern.is_empty() || item.name.to_lowercase().contains(&self.pattern);
        tag_ok && zone_ok && text_ok
    }

    /// Accepted items in cache order.
    pub fn visible<'a>(&self, items: &'a ItemIndex) -> Vec<&'a Item> {
        items.iter().filter(|i| self.accept(i)).collect()
    }

    /// Accepted items ordered by `sort`; ties keep cache order.
    pub fn visible_sorted<'a>(&self, items: &'a ItemIndex, sort: SortDescriptor) -> Vec<&'a Item> {
        let mut visible = self.visible(items);
        visible.sort_by(|a, b| sort.compare(a, b));
        visible
    }
}

/// A list view whose rows are the items the filter accepts.
///
/// Membership is re-evaluated over the whole cache after every filter
/// mutation and every scene event.
#[derive(Debug, Clone, Default)]
pub struct FilteredItemList {
    filter: ItemFilter,
    sort: Option<SortDescriptor>,
    rows: Vec<ItemId>,
}

impl FilteredItemList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(filter: ItemFilter, items: &ItemIndex) -> Self {
        let mut list = Self {
            filter,
            sort: None,
            rows: Vec::new(),
        };
        list.refresh(items);
        list
    }

    pub fn filter(&self) -> &ItemFilter {
        &self.filter
    }

    /// Visible item ids, in display order.
    pub fn rows(&self) -> &[ItemId] {
        &self.rows
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.rows.contains(&id)
    }

    pub fn refresh(&mut self, items: &ItemIndex) {
        let visible = match self.sort {
            Some(sort) => self.filter.visible_sorted(items, sort),
            None => self.filter.visible(items),
        };
        self.rows = visible.into_iter().map(|i| i.id).collect();
    }

    pub fn set_sort(&mut self, sort: Option<SortDescriptor>, items: &ItemIndex) {
        self.sort = sort;
        self.refresh(items);
    }

    pub fn add_tag(&mut self, tag: &str, items: &ItemIndex) {
        self.filter.add_tag(tag);
        self.refresh(items);
    }

    pub fn remove_tag(&mut self, tag: &str, items: &ItemIndex) {
        self.filter.remove_tag(tag);
        self.refresh(items);
    }

    pub fn clear_tags(&mut self, items: &ItemIndex) {
        self.filter.clear_tags();
        self.refresh(items);
    }

    pub fn add_zone(&mut self, zone: Zone, items: &ItemIndex) {
        self.filter.add_zone(zone);
        self.refresh(items);
    }

    pub fn remove_zone(&mut self, zone: Zone, items: &ItemIndex) {
        self.filter.remove_zone(zone);
        self.refresh(items);
    }

    pub fn clear_zones(&mut self, items: &ItemIndex) {
        self.filter.clear_zones();
        self.refresh(items);
    }

    pub fn set_text_pattern(&mut self, pattern: &str, items: &ItemIndex) {
        self.filter.set_text_pattern(pattern);
        self.refresh(items);
    }
}

impl SceneObserver for FilteredItemList {
    fn on_scene_event(&mut self, _event: &SceneEvent, items: &ItemIndex) {
        self.refresh(items);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ItemTemplate;
    use crate::item::Position;
    use rstest::rstest;
    use uuid::Uuid;

    fn item(name: &str, tags: &[&str], x: f64, y: f64) -> Item {
        let mut item = Item::from_template(
            Uuid::new_v4(),
            &ItemTemplate::default(),
            Position::new(x, y),
            "t",
        );
        item.name = name.to_string();
        for tag in tags {
            item.tags.insert(tag);
        }
        item
    }

    /// A: tags {x}, zone P1. B: tags {y}, zone P2.
    fn pair() -> (Item, Item, ItemIndex) {
        let a = item("Alpha", &["x"], -1.0, -1.0);
        let b = item("Beta", &["y"], 1.0, -1.0);
        let index = ItemIndex::from_items(vec![a.clone(), b.clone()]);
        (a, b, index)
    }

    fn names(items: Vec<&Item>) -> Vec<&str> {
        items.into_iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn empty_filter_accepts_everything() {
        let (_, _, index) = pair();
        let filter = ItemFilter::new();
        assert!(filter.is_empty());
        assert_eq!(names(filter.visible(&index)), vec!["Alpha", "Beta"]);
    }

    // Boolean table for the A/B pair: (tags, zones) -> visible names.
    #[rstest]
    #[case(&["x"], &[], &["Alpha"])]
    #[case(&["y"], &[], &["Beta"])]
    #[case(&["x", "y"], &[], &["Alpha", "Beta"])]
    #[case(&[], &[Zone::P2], &["Beta"])]
    #[case(&["x"], &[Zone::P2], &[])]
    #[case(&["x"], &[Zone::P1, Zone::P2], &["Alpha"])]
    #[case(&["x", "y"], &[Zone::P2], &["Beta"])]
    #[case(&["z"], &[], &[])]
    #[case(&[], &[Zone::X], &[])]
    fn tag_or_zone_and(
        #[case] tags: &[&str],
        #[case] zones: &[Zone],
        #[case] expected: &[&str],
    ) {
        let (_, _, index) = pair();
        let mut filter = ItemFilter::new();
        for tag in tags {
            filter.add_tag(tag);
        }
        for zone in zones {
            filter.add_zone(*zone);
        }
        assert_eq!(names(filter.visible(&index)), expected);
    }

    #[test]
    fn text_pattern_is_case_insensitive_substring() {
        let (_, _, index) = pair();
        let mut filter = ItemFilter::new();
        assert!(filter.set_text_pattern("ALP"));
        assert!(!filter.set_text_pattern("alp"));
        assert_eq!(names(filter.visible(&index)), vec!["Alpha"]);
        filter.set_text_pattern("");
        assert_eq!(filter.visible(&index).len(), 2);
    }

    #[test]
    fn filter_tags_are_normalized() {
        let (_, _, index) = pair();
        let mut filter = ItemFilter::new();
        filter.add_tag(" X ");
        assert_eq!(names(filter.visible(&index)), vec!["Alpha"]);
        assert!(filter.remove_tag("x"));
        assert!(!filter.remove_tag("x"));
    }

    #[test]
    fn clear_reports_change() {
        let mut filter = ItemFilter::new();
        assert!(!filter.clear_tags());
        filter.add_zone(Zone::P3);
        assert!(filter.clear_zones());
        assert!(filter.is_empty());
    }

    #[test]
    fn explicit_sort() {
        let far = item("charlie", &[], 30.0, 40.0);
        let near = item("Bravo", &[], 3.0, 4.0);
        let mid = item("alpha", &[], 6.0, 8.0);
        let index = ItemIndex::from_items(vec![far, near, mid]);
        let filter = ItemFilter::new();

        assert_eq!(names(filter.visible(&index)), vec!["charlie", "Bravo", "alpha"]);
        assert_eq!(
            names(filter.visible_sorted(&index, SortDescriptor::ascending(SortKey::Distance))),
            vec!["Bravo", "alpha", "charlie"]
        );
        assert_eq!(
            names(filter.visible_sorted(&index, SortDescriptor::ascending(SortKey::Name))),
            vec!["alpha", "Bravo", "charlie"]
        );
        assert_eq!(
            names(filter.visible_sorted(&index, SortDescriptor::descending(SortKey::Distance))),
            vec!["charlie", "alpha", "Bravo"]
        );
    }

    #[test]
    fn list_reevaluates_on_mutation() {
        let (a, b, index) = pair();
        let mut list = FilteredItemList::with_filter(ItemFilter::new(), &index);
        assert_eq!(list.rows(), &[a.id, b.id]);
        list.add_tag("x", &index);
        assert_eq!(list.rows(), &[a.id]);
        list.add_zone(Zone::P2, &index);
        assert!(list.rows().is_empty());
        list.clear_tags(&index);
        assert_eq!(list.rows(), &[b.id]);
        list.clear_zones(&index);
        list.set_sort(Some(SortDescriptor::descending(SortKey::Name)), &index);
        assert_eq!(list.rows(), &[b.id, a.id]);
    }
}
