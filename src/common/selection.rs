use crate::{
    common,
    expression::{Expression, ExpressionKind},
};

use indexmap::IndexMap;
use std::hash;

/// Map for selecting attributes in projection expressions.
///
/// ```rust
/// use dynamodb_odm::common::selection;
///
/// let selection = selection::SelectionMap::Leaves(vec![
///     "id".to_string(),
///     "name".to_string(),
/// ]);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SelectionMap {
    /// Leaf selection - a flat list of attribute names to select.
    Leaves(Vec<String>),
    /// Node selection - nested selection for hierarchical attribute paths.
    Node(IndexMap<String, SelectionMap>),
}

impl hash::Hash for SelectionMap {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        match self {
            Self::Leaves(leaves) => leaves.hash(state),
            Self::Node(map) => map.iter().for_each(|(key, value)| {
                key.hash(state);
                value.hash(state);
            }),
        }
    }
}

impl From<Vec<String>> for SelectionMap {
    fn from(paths: Vec<String>) -> Self {
        Self::Leaves(paths)
    }
}

impl From<SelectionMap> for common::ExpressionInput {
    fn from(selection_map: SelectionMap) -> Self {
        selection_map.into_expression().into_input()
    }
}

impl SelectionMap {
    fn collect_paths(self, parent: Option<&str>, paths: &mut Vec<String>) {
        let join = |key: &str| match parent {
            Some(parent) => format!("{parent}.{key}"),
            None => key.to_string(),
        };
        match self {
            Self::Leaves(leaves) => paths.extend(leaves.iter().map(|leaf| join(leaf))),
            Self::Node(map) => {
                for (key, value) in map {
                    value.collect_paths(Some(&join(&key)), paths);
                }
            }
        }
    }

    /// Projection expression selecting every path of the map.
    pub fn into_expression(self) -> Expression {
        let mut paths = Vec::new();
        self.collect_paths(None, &mut paths);
        let mut expression = Expression::new(ExpressionKind::Projection);
        let placeholders: Vec<_> = paths.iter().map(|path| expression.add_name(path)).collect();
        let mut input = expression.into_input();
        input.expression = placeholders.join(", ");
        Expression::from_input(ExpressionKind::Projection, input)
    }
}
