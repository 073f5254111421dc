// Cell classification
//
// Every non-blank code cell gets exactly one category. Rules are evaluated
// in table order and the first match wins, so a cell that imports a
// plotting library and also plots is an `imports` cell only when imports
// dominate it.

use crate::error::Result;
use crate::parser::{blank_magics, Cell, Notebook, PythonScanner, SourceOutline};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification label of a code cell
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Imports,
    FunctionDefinitions,
    ModelTraining,
    DataProcessing,
    Visualization,
    GeneralCode,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Imports,
        Category::FunctionDefinitions,
        Category::ModelTraining,
        Category::DataProcessing,
        Category::Visualization,
        Category::GeneralCode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Imports => "imports",
            Category::FunctionDefinitions => "function_definitions",
            Category::ModelTraining => "model_training",
            Category::DataProcessing => "data_processing",
            Category::Visualization => "visualization",
            Category::GeneralCode => "general_code",
        }
    }

    /// Human-readable label, e.g. "Data Processing"
    pub fn title(&self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cell source prepared for rule evaluation
#[derive(Debug, Clone)]
pub struct CellSource {
    /// Lowercased code with magics and comment lines removed
    code: String,
    outline: SourceOutline,
}

impl CellSource {
    pub fn new(text: &str, outline: SourceOutline) -> Self {
        let code = blank_magics(text)
            .lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .collect::<Vec<_>>()
            .join("\n")
            .to_lowercase();
        Self { code, outline }
    }

    pub fn outline(&self) -> &SourceOutline {
        &self.outline
    }

    /// Check if any pattern occurs in the code
    ///
    /// Patterns starting with an identifier character only match at an
    /// identifier boundary, so `ax.` does not match inside `max.`.
    pub fn mentions_any(&self, patterns: &[&str]) -> bool {
        patterns.iter().any(|p| contains_token(&self.code, p))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn contains_token(haystack: &str, needle: &str) -> bool {
    let needs_boundary = needle.chars().next().is_some_and(is_ident_char);
    haystack.match_indices(needle).any(|(pos, _)| {
        !needs_boundary || !haystack[..pos].chars().next_back().is_some_and(is_ident_char)
    })
}

/// A classification rule: category plus predicate over cell source
#[derive(Clone, Copy)]
pub struct Rule {
    pub category: Category,
    pub matches: fn(&CellSource) -> bool,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("category", &self.category).finish()
    }
}

/// Rules in priority order; the last one always matches
pub const RULES: &[Rule] = &[
    Rule {
        category: Category::Imports,
        matches: is_import_cell,
    },
    Rule {
        category: Category::ModelTraining,
        matches: mentions_training,
    },
    Rule {
        category: Category::Visualization,
        matches: mentions_plotting,
    },
    Rule {
        category: Category::FunctionDefinitions,
        matches: is_definition_cell,
    },
    Rule {
        category: Category::DataProcessing,
        matches: mentions_data_processing,
    },
    Rule {
        category: Category::GeneralCode,
        matches: always,
    },
];

pub const TRAINING_PATTERNS: &[&str] = &[
    ".fit(",
    ".fit_generator(",
    ".partial_fit(",
    ".train(",
    "model.compile(",
    ".backward(",
    "optimizer.step(",
    "for epoch in",
    "epochs=",
    "cross_val_score(",
    "gridsearchcv(",
    "randomizedsearchcv(",
];

pub const PLOTTING_PATTERNS: &[&str] = &[
    "plt.",
    "sns.",
    "seaborn.",
    "px.",
    "go.figure(",
    "make_subplots(",
    ".plot(",
    ".hist(",
    ".scatter(",
    "imshow(",
    "fig.show(",
    "ax.",
    "axes[",
];

pub const DATA_PATTERNS: &[&str] = &[
    "read_csv(",
    "read_parquet(",
    "read_json(",
    "read_excel(",
    "read_sql(",
    ".dropna(",
    ".fillna(",
    ".groupby(",
    ".merge(",
    ".pivot_table(",
    ".astype(",
    ".apply(",
    ".drop(",
    ".rename(",
    "pd.concat(",
    "get_dummies(",
    "train_test_split(",
    ".fit_transform(",
    ".transform(",
    "preprocess",
    "clean",
    "normaliz",
    "standardscaler(",
    "minmaxscaler(",
    "labelencoder(",
    "onehotencoder(",
];

fn is_import_cell(source: &CellSource) -> bool {
    let outline = source.outline();
    outline.import_statements > 0 && outline.import_statements * 2 > outline.statements
}

fn mentions_training(source: &CellSource) -> bool {
    source.mentions_any(TRAINING_PATTERNS)
}

fn mentions_plotting(source: &CellSource) -> bool {
    source.mentions_any(PLOTTING_PATTERNS)
}

fn is_definition_cell(source: &CellSource) -> bool {
    let outline = source.outline();
    outline.definitions > 0 && outline.definitions * 2 >= outline.non_import_statements()
}

fn mentions_data_processing(source: &CellSource) -> bool {
    source.mentions_any(DATA_PATTERNS)
}

fn always(_: &CellSource) -> bool {
    true
}

/// Apply the rule table; first match wins
pub fn classify_source(source: &CellSource) -> Category {
    RULES
        .iter()
        .find(|rule| (rule.matches)(source))
        .map(|rule| rule.category)
        .unwrap_or(Category::GeneralCode)
}

/// A code cell with its category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedCell {
    pub cell: Cell,
    pub category: Category,
}

/// Assigns categories to code cells
pub struct Classifier {
    scanner: PythonScanner,
}

impl Classifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            scanner: PythonScanner::new()?,
        })
    }

    /// Classify one cell's source text
    pub fn classify(&mut self, text: &str) -> Category {
        let outline = match self.scanner.scan(text) {
            Ok(outline) => outline,
            Err(e) => {
                tracing::warn!("classifying without outline: {}", e);
                SourceOutline::default()
            }
        };
        classify_source(&CellSource::new(text, outline))
    }

    /// Classify every non-blank code cell, in notebook order
    pub fn classify_notebook(&mut self, notebook: &Notebook) -> Vec<ClassifiedCell> {
        notebook
            .classifiable_cells()
            .map(|cell| {
                let category = self.classify(&cell.source);
                tracing::debug!(cell = cell.index, %category, "classified cell");
                ClassifiedCell {
                    cell: cell.clone(),
                    category,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Cell;

    fn classify(text: &str) -> Category {
        Classifier::new().unwrap().classify(text)
    }

    fn source(text: &str, outline: SourceOutline) -> CellSource {
        CellSource::new(text, outline)
    }

    #[test]
    fn test_rule_order() {
        let order: Vec<_> = RULES.iter().map(|r| r.category).collect();
        assert_eq!(
            order,
            vec![
                Category::Imports,
                Category::ModelTraining,
                Category::Visualization,
                Category::FunctionDefinitions,
                Category::DataProcessing,
                Category::GeneralCode,
            ]
        );
    }

    #[test]
    fn test_last_rule_always_matches() {
        let last = RULES.last().unwrap();
        assert!((last.matches)(&source("", SourceOutline::default())));
    }

    #[test]
    fn test_every_category_has_a_rule() {
        for category in Category::ALL {
            assert!(RULES.iter().any(|r| r.category == category), "{}", category);
        }
    }

    #[test]
    fn test_scenario_cells() {
        assert_eq!(classify("import numpy as np"), Category::Imports);
        assert_eq!(classify("def f(x): return x*2"), Category::FunctionDefinitions);
        assert_eq!(classify("model.fit(X,y)"), Category::ModelTraining);
        assert_eq!(classify("plt.plot(x,y)"), Category::Visualization);
    }

    #[test]
    fn test_import_dominance() {
        assert_eq!(
            classify("import pandas as pd\nimport numpy as np\ndf = pd.read_csv('a.csv')"),
            Category::Imports
        );
        assert_eq!(
            classify("import matplotlib.pyplot as plt\nplt.plot(x, y)"),
            Category::Visualization
        );
    }

    #[test]
    fn test_training_beats_plotting() {
        assert_eq!(
            classify("history = model.fit(X, y, epochs=5)\nplt.plot(history.history['loss'])"),
            Category::ModelTraining
        );
    }

    #[test]
    fn test_definition_with_training_vocabulary() {
        let text = "def train(model, X, y):\n    model.fit(X, y)\n    return model\n";
        assert_eq!(classify(text), Category::ModelTraining);
    }

    #[test]
    fn test_class_definition() {
        let text = "class Scaler:\n    def __init__(self):\n        self.mean = 0\n";
        assert_eq!(classify(text), Category::FunctionDefinitions);
    }

    #[test]
    fn test_data_processing() {
        assert_eq!(classify("df = df.dropna()"), Category::DataProcessing);
        assert_eq!(
            classify("X_scaled = scaler.fit_transform(X)"),
            Category::DataProcessing
        );
        assert_eq!(classify("df = pd.read_csv('data.csv')"), Category::DataProcessing);
    }

    #[test]
    fn test_general_code() {
        assert_eq!(classify("x = 1\nprint(x)"), Category::GeneralCode);
        assert_eq!(classify("%matplotlib inline"), Category::GeneralCode);
    }

    #[test]
    fn test_comments_do_not_classify() {
        assert_eq!(classify("# plt.plot(x)\ny = 2"), Category::GeneralCode);
    }

    #[test]
    fn test_token_boundary() {
        assert_eq!(classify("result = max.value"), Category::GeneralCode);
        assert_eq!(classify("ax.set_title('loss')"), Category::Visualization);
        assert!(contains_token("df.plot(kind='bar')", ".plot("));
        assert!(!contains_token("relax.x", "ax."));
        assert!(contains_token("(ax.x)", "ax."));
    }

    #[test]
    fn test_classify_notebook_skips_blank_cells() {
        let nb = Notebook::from_cells(vec![
            Cell::code(0, "import numpy as np"),
            Cell::code(1, "   \n"),
            Cell::documentation(2, "# Heading"),
            Cell::code(3, "plt.show()"),
        ]);
        let classified = Classifier::new().unwrap().classify_notebook(&nb);
        let pairs: Vec<_> = classified.iter().map(|c| (c.cell.index, c.category)).collect();
        assert_eq!(
            pairs,
            vec![(0, Category::Imports), (3, Category::Visualization)]
        );
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&Category::ModelTraining).unwrap();
        assert_eq!(json, "\"model_training\"");
        assert_eq!(Category::DataProcessing.title(), "Data Processing");
    }
}
