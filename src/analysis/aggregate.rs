// Grouping of classified cells into output units
//
// Routing is a static table from category to unit. Aggregation only
// partitions: cells keep their notebook order inside each unit.

use crate::analysis::classify::{Category, ClassifiedCell};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of a generated source unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitName {
    Main,
    Functions,
    Training,
}

impl UnitName {
    /// Units of the fixed project layout, in output order
    pub const ALL: [UnitName; 3] = [UnitName::Main, UnitName::Functions, UnitName::Training];

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitName::Main => "main",
            UnitName::Functions => "functions",
            UnitName::Training => "training",
        }
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default category routing
pub const DEFAULT_ROUTES: &[(Category, UnitName)] = &[
    (Category::Imports, UnitName::Main),
    (Category::DataProcessing, UnitName::Main),
    (Category::Visualization, UnitName::Main),
    (Category::GeneralCode, UnitName::Main),
    (Category::FunctionDefinitions, UnitName::Functions),
    (Category::ModelTraining, UnitName::Training),
];

/// Category to unit routing table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitMapping {
    routes: BTreeMap<Category, UnitName>,
}

impl Default for UnitMapping {
    fn default() -> Self {
        Self {
            routes: DEFAULT_ROUTES.iter().copied().collect(),
        }
    }
}

impl UnitMapping {
    /// Default routing with some categories redirected
    pub fn with_overrides(overrides: &BTreeMap<Category, UnitName>) -> Self {
        let mut mapping = Self::default();
        mapping
            .routes
            .extend(overrides.iter().map(|(c, u)| (*c, *u)));
        mapping
    }

    pub fn route(&self, category: Category) -> UnitName {
        self.routes.get(&category).copied().unwrap_or(UnitName::Main)
    }

    /// Categories routed to a unit
    pub fn categories_for(&self, unit: UnitName) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| self.route(*c) == unit)
            .collect()
    }
}

/// A named group of classified cells destined for one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicalUnit {
    pub name: UnitName,
    pub cells: Vec<ClassifiedCell>,
}

impl LogicalUnit {
    pub fn empty(name: UnitName) -> Self {
        Self {
            name,
            cells: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Notebook indices of member cells
    pub fn indices(&self) -> Vec<usize> {
        self.cells.iter().map(|c| c.cell.index).collect()
    }
}

/// Partitions classified cells into logical units
#[derive(Debug, Clone, Default)]
pub struct FileAggregator {
    mapping: UnitMapping,
}

impl FileAggregator {
    pub fn new(mapping: UnitMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &UnitMapping {
        &self.mapping
    }

    /// One unit per layout entry, empty units included
    pub fn aggregate(&self, cells: &[ClassifiedCell]) -> Vec<LogicalUnit> {
        let mut units: Vec<LogicalUnit> = UnitName::ALL.into_iter().map(LogicalUnit::empty).collect();

        for classified in cells {
            let target = self.mapping.route(classified.category);
            if let Some(unit) = units.iter_mut().find(|u| u.name == target) {
                unit.cells.push(classified.clone());
            }
        }

        units
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Cell;

    fn classified(index: usize, category: Category) -> ClassifiedCell {
        ClassifiedCell {
            cell: Cell::code(index, format!("# cell {}", index)),
            category,
        }
    }

    fn unit(units: &[LogicalUnit], name: UnitName) -> &LogicalUnit {
        units.iter().find(|u| u.name == name).unwrap()
    }

    #[test]
    fn test_every_category_is_routed() {
        for category in Category::ALL {
            assert!(DEFAULT_ROUTES.iter().any(|(c, _)| *c == category), "{}", category);
        }
    }

    #[test]
    fn test_scenario_partition() {
        let cells = vec![
            classified(0, Category::Imports),
            classified(1, Category::FunctionDefinitions),
            classified(2, Category::ModelTraining),
            classified(3, Category::Visualization),
        ];
        let units = FileAggregator::default().aggregate(&cells);

        assert_eq!(unit(&units, UnitName::Main).indices(), vec![0, 3]);
        assert_eq!(unit(&units, UnitName::Functions).indices(), vec![1]);
        assert_eq!(unit(&units, UnitName::Training).indices(), vec![2]);
    }

    #[test]
    fn test_empty_units_are_emitted() {
        let units = FileAggregator::default().aggregate(&[classified(0, Category::GeneralCode)]);
        let names: Vec<_> = units.iter().map(|u| u.name).collect();
        assert_eq!(names, UnitName::ALL.to_vec());
        assert!(unit(&units, UnitName::Training).is_empty());
        assert!(unit(&units, UnitName::Functions).is_empty());
    }

    #[test]
    fn test_order_is_preserved() {
        let cells = vec![
            classified(0, Category::Visualization),
            classified(2, Category::Imports),
            classified(5, Category::DataProcessing),
            classified(7, Category::GeneralCode),
        ];
        let units = FileAggregator::default().aggregate(&cells);
        assert_eq!(unit(&units, UnitName::Main).indices(), vec![0, 2, 5, 7]);
    }

    #[test]
    fn test_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert(Category::Visualization, UnitName::Functions);
        let mapping = UnitMapping::with_overrides(&overrides);

        assert_eq!(mapping.route(Category::Visualization), UnitName::Functions);
        assert_eq!(mapping.route(Category::Imports), UnitName::Main);
        assert_eq!(
            mapping.categories_for(UnitName::Functions),
            vec![Category::FunctionDefinitions, Category::Visualization]
        );
    }
}
