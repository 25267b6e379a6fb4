//! Session-owned parameter state: configs, values and the dirty-set

use std::collections::HashSet;

use super::types::SnapshotRow;
use crate::fixable::{
    flatten_configs, FixableConfig, FixableId, FixableValue, NamedConfigs, NamedValues,
};

/// Ids edited locally since the last flush, in first-edit order
#[derive(Debug, Default, Clone)]
pub struct DirtySet {
    order: Vec<FixableId>,
    members: HashSet<FixableId>,
}

impl DirtySet {
    /// Mark `id` dirty; returns false if it already was
    pub fn insert(&mut self, id: FixableId) -> bool {
        if self.members.insert(id.clone()) {
            self.order.push(id);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, id: &FixableId) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> &[FixableId] {
        &self.order
    }

    /// Drain all ids in insertion order
    pub fn take(&mut self) -> Vec<FixableId> {
        self.members.clear();
        std::mem::take(&mut self.order)
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.order.clear();
    }
}

/// Configs, values and dirty-set of one session
#[derive(Debug, Default)]
pub struct SessionStore {
    stream_name: Option<String>,
    /// Top-level configs as announced, groups and dividers included
    configs: NamedConfigs,
    /// Valued entries with group contents promoted
    flat: NamedConfigs,
    values: NamedValues,
    dirty: DirtySet,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything with a freshly started session
    pub fn begin_session(
        &mut self,
        stream_name: String,
        configs: Vec<(FixableId, FixableConfig)>,
        values: Vec<(FixableId, FixableValue)>,
    ) {
        self.stream_name = Some(stream_name);
        self.configs = configs.into_iter().collect();
        self.flat = flatten_configs(&self.configs);
        self.values = values.into_iter().collect();
        self.dirty.clear();
    }

    /// Overwrite a value and mark it dirty
    pub fn apply_local_edit(&mut self, id: FixableId, value: FixableValue) {
        self.values.insert(id.clone(), value);
        self.dirty.insert(id);
    }

    /// Overwrite values received from the peer, leaving the dirty-set alone
    pub fn apply_inbound(&mut self, values: Vec<(FixableId, FixableValue)>) {
        self.values.extend(values);
    }

    /// Current values of the dirty ids, clearing the dirty-set
    pub fn take_dirty_batch(&mut self) -> Vec<(FixableId, FixableValue)> {
        self.dirty
            .take()
            .into_iter()
            .filter_map(|id| self.values.get(&id).map(|v| (id, *v)))
            .collect()
    }

    pub fn stream_name(&self) -> Option<&str> {
        self.stream_name.as_deref()
    }

    pub fn configs(&self) -> &NamedConfigs {
        &self.configs
    }

    /// Config of a valued fixable, looking inside groups
    pub fn config(&self, id: &FixableId) -> Option<&FixableConfig> {
        self.flat.get(id)
    }

    pub fn value(&self, id: &FixableId) -> Option<FixableValue> {
        self.values.get(id).copied()
    }

    pub fn values_list(&self) -> Vec<(FixableId, FixableValue)> {
        let mut values: Vec<_> = self.values.iter().map(|(id, v)| (id.clone(), *v)).collect();
        values.sort_by(|a, b| a.0.cmp(&b.0));
        values
    }

    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    /// Display rows in display order, group contents indented under their group
    pub fn rows(&self) -> Vec<SnapshotRow> {
        let mut rows = Vec::new();
        let top: Vec<_> = self.configs.iter().collect();
        self.push_rows(top, 0, &mut rows);
        rows
    }

    fn push_rows(
        &self,
        mut sorted: Vec<(&FixableId, &FixableConfig)>,
        depth: usize,
        rows: &mut Vec<SnapshotRow>,
    ) {
        sorted.sort_by_key(|(id, config)| (config.display().order, (*id).clone()));

        for (id, config) in sorted {
            rows.push(SnapshotRow {
                id: id.clone(),
                label: config.display().label.clone(),
                kind: config.kind(),
                range: config.range(),
                value: self.value(id),
                depth,
            });
            if let FixableConfig::Group { contents, .. } = config {
                let nested = contents.iter().map(|(id, c)| (id, c)).collect();
                self.push_rows(nested, depth + 1, rows);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixable::FixableDisplay;
    use proptest::prelude::*;

    fn float(label: &str, order: i32) -> FixableConfig {
        FixableConfig::Float {
            min: 0.0,
            max: 100.0,
            display: FixableDisplay::new(label, order),
        }
    }

    fn started() -> SessionStore {
        let mut store = SessionStore::new();
        store.begin_session(
            "test".to_string(),
            vec![
                (FixableId::new("a"), float("A", 2)),
                (FixableId::new("b"), float("B", 1)),
                (
                    FixableId::new("g"),
                    FixableConfig::Group {
                        contents: vec![(FixableId::new("c"), float("C", 0))],
                        display: FixableDisplay::new("G", 3),
                    },
                ),
            ],
            vec![
                (FixableId::new("a"), FixableValue::Float(1.0)),
                (FixableId::new("b"), FixableValue::Float(2.0)),
                (FixableId::new("c"), FixableValue::Float(3.0)),
            ],
        );
        store
    }

    #[test]
    fn test_dirty_set_collapses_duplicates() {
        let mut dirty = DirtySet::default();
        assert!(dirty.insert(FixableId::new("a")));
        assert!(dirty.insert(FixableId::new("b")));
        assert!(!dirty.insert(FixableId::new("a")));

        assert_eq!(dirty.take(), vec![FixableId::new("a"), FixableId::new("b")]);
        assert!(dirty.is_empty());
        assert!(!dirty.contains(&FixableId::new("a")));
    }

    #[test]
    fn test_local_edit_marks_dirty() {
        let mut store = started();
        store.apply_local_edit(FixableId::new("a"), FixableValue::Float(10.0));

        assert!(store.dirty().contains(&FixableId::new("a")));
        assert_eq!(
            store.take_dirty_batch(),
            vec![(FixableId::new("a"), FixableValue::Float(10.0))]
        );
        assert!(store.take_dirty_batch().is_empty());
    }

    #[test]
    fn test_inbound_does_not_mark_dirty() {
        let mut store = started();
        store.apply_inbound(vec![(FixableId::new("b"), FixableValue::Float(7.0))]);

        assert_eq!(store.value(&FixableId::new("b")), Some(FixableValue::Float(7.0)));
        assert!(store.dirty().is_empty());
        assert!(store.take_dirty_batch().is_empty());
    }

    #[test]
    fn test_begin_session_replaces_everything() {
        let mut store = started();
        store.apply_local_edit(FixableId::new("a"), FixableValue::Float(10.0));

        store.begin_session(
            "next".to_string(),
            vec![(
                FixableId::new("z"),
                FixableConfig::Bool {
                    display: FixableDisplay::new("Z", 0),
                },
            )],
            vec![(FixableId::new("z"), FixableValue::Bool(true))],
        );

        assert_eq!(store.stream_name(), Some("next"));
        assert!(store.dirty().is_empty());
        assert!(store.value(&FixableId::new("a")).is_none());
        assert!(store.config(&FixableId::new("a")).is_none());
        assert_eq!(store.value(&FixableId::new("z")), Some(FixableValue::Bool(true)));
    }

    #[test]
    fn test_group_contents_are_configs() {
        let store = started();
        assert!(store.config(&FixableId::new("c")).is_some());
        assert!(store.config(&FixableId::new("g")).is_none());
    }

    #[test]
    fn test_rows_follow_display_order() {
        let store = started();
        let rows: Vec<_> = store
            .rows()
            .into_iter()
            .map(|r| (r.id.name, r.depth))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("b".to_string(), 0),
                ("a".to_string(), 0),
                ("g".to_string(), 0),
                ("c".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_rows_indent_nested_groups() {
        let mut store = SessionStore::new();
        store.begin_session(
            "nested".to_string(),
            vec![(
                FixableId::new("outer"),
                FixableConfig::Group {
                    contents: vec![(
                        FixableId::new("inner"),
                        FixableConfig::Group {
                            contents: vec![(FixableId::new("leaf"), float("Leaf", 0))],
                            display: FixableDisplay::new("Inner", 0),
                        },
                    )],
                    display: FixableDisplay::new("Outer", 0),
                },
            )],
            vec![(FixableId::new("leaf"), FixableValue::Float(7.0))],
        );

        let rows: Vec<_> = store
            .rows()
            .into_iter()
            .map(|r| (r.id.name, r.depth, r.value))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("outer".to_string(), 0, None),
                ("inner".to_string(), 1, None),
                ("leaf".to_string(), 2, Some(FixableValue::Float(7.0))),
            ]
        );
        assert!(store.config(&FixableId::new("leaf")).is_some());
    }

    proptest! {
        #[test]
        fn prop_batch_holds_latest_value_once_per_id(
            edits in proptest::collection::vec((0usize..4, -100.0f32..100.0), 1..40)
        ) {
            let names = ["a", "b", "c", "d"];
            let mut store = SessionStore::new();
            let mut expected = std::collections::HashMap::new();

            for (index, value) in &edits {
                let id = FixableId::new(names[*index]);
                store.apply_local_edit(id.clone(), FixableValue::Float(*value));
                expected.insert(id, FixableValue::Float(*value));
            }

            let batch = store.take_dirty_batch();
            let ids: HashSet<_> = batch.iter().map(|(id, _)| id.clone()).collect();
            prop_assert_eq!(ids.len(), batch.len());
            prop_assert_eq!(batch.len(), expected.len());
            for (id, value) in batch {
                prop_assert_eq!(Some(&value), expected.get(&id));
            }
        }
    }
}
