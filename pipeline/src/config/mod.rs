//! Configuration document for the transformation pipeline.
//!
//! The pipeline is driven entirely by a declarative JSON document with
//! three sections under `data`:
//!
//! - `data_cleansing`: identifier column and row-aggregation rules
//! - `data_fitting`: per-column missing-data policies (document order
//!   is the application order)
//! - `data_derivation`: derived-column rules, applied in list order
//!
//! Unknown or extra keys (the document also carries `ui`/`stats`
//! sections for the excluded layers) are ignored. The raw document is
//! checked against an embedded draft-7 schema before typed parsing, and
//! [`PipelineConfig::validate`] rejects cross-rule problems, so a bad
//! document fails before any data is touched.

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Document structure
// =============================================================================

/// The full configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub data: DataConfig,
}

/// The `data` section: everything the pipeline interprets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub data_cleansing: CleansingConfig,

    /// Column name → fitting rule, in document order.
    #[serde(default)]
    pub data_fitting: IndexMap<String, FitRule>,

    #[serde(default)]
    pub data_derivation: DerivationConfig,
}

/// The `data_cleansing` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleansingConfig {
    /// Column whose value names a logical subject after aggregation.
    pub id_column: String,

    /// Row-aggregation rules.
    #[serde(default)]
    pub aggregate: Vec<AggregateRule>,
}

/// Folds a set of raw columns into one list-valued field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateRule {
    /// Name of the resulting list-valued field.
    pub aggregate_column: String,

    /// Which raw columns feed each sub-record, and their renamed keys.
    pub column_mapping: Vec<ColumnMapping>,

    /// Drop sub-records whose first mapped field is missing or zero
    /// (rows that exist only to carry the subject's other columns).
    #[serde(default)]
    pub skip_empty: bool,
}

/// One raw-column → sub-record-field rename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub old_name: String,
    pub new_name: String,
}

// =============================================================================
// Fitting rules
// =============================================================================

/// A missing-data policy: either a simple tag or a calculated-field spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FitRule {
    Policy(FitPolicy),
    Calc(CalcSpec),
}

/// Simple fitting policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitPolicy {
    Drop,
    Mean,
    /// `medium` is a legacy spelling still found in older documents.
    #[serde(alias = "medium")]
    Median,
    Mode,
    Zero,
    /// Bare `"calc"` without a spec object; rejected by [`PipelineConfig::validate`].
    Calc,
}

/// Two-operand arithmetic spec for calculated imputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalcSpec {
    /// Column holding the left operand.
    pub first_input: String,
    /// Only `-` is supported.
    pub operator: String,
    /// Column holding the right operand.
    pub second_input: String,
    /// Result unit; time units make the operands parse as dates.
    /// Only `month` is supported.
    pub unit: String,
}

// =============================================================================
// Derivation rules
// =============================================================================

/// The `data_derivation` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DerivationConfig {
    #[serde(default)]
    pub columns: Vec<DeriveRule>,
}

/// One derived-column rule, dispatched on `method`.
///
/// Tag spellings (`Count` capitalized, the rest lowercase) match the
/// documents this grammar grew up with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum DeriveRule {
    /// Length of a list-valued field.
    #[serde(rename = "Count")]
    Count {
        name: String,
        base_column: String,
        #[serde(default)]
        overwrite: bool,
    },

    /// Range-bucket mapping of a numeric column onto coded values.
    #[serde(rename = "mapping")]
    Mapping {
        name: String,
        base_column: String,
        map: Vec<MapBucket>,
        #[serde(default)]
        overwrite: bool,
    },

    /// Ordered multi-predicate clauses with a mandatory default.
    #[serde(rename = "conditional")]
    Conditional {
        name: String,
        rules: Vec<Clause>,
        default: Outcome,
        #[serde(default)]
        overwrite: bool,
    },
}

impl DeriveRule {
    /// Name of the derived column this rule produces.
    pub fn name(&self) -> &str {
        match self {
            DeriveRule::Count { name, .. }
            | DeriveRule::Mapping { name, .. }
            | DeriveRule::Conditional { name, .. } => name,
        }
    }

    /// Columns this rule reads.
    pub fn reads(&self) -> Vec<&str> {
        match self {
            DeriveRule::Count { base_column, .. } => vec![base_column.as_str()],
            DeriveRule::Mapping { base_column, .. } => vec![base_column.as_str()],
            DeriveRule::Conditional { rules, .. } => rules
                .iter()
                .flat_map(|c| c.conditions.keys().map(String::as_str))
                .collect(),
        }
    }

    /// Whether the rule may replace an existing column of the same name.
    pub fn overwrite(&self) -> bool {
        match self {
            DeriveRule::Count { overwrite, .. }
            | DeriveRule::Mapping { overwrite, .. }
            | DeriveRule::Conditional { overwrite, .. } => *overwrite,
        }
    }
}

/// One named bucket of a mapping rule.
///
/// In the document a bucket is a single-entry object keyed by its label:
/// `{"normal": {"ceiling": 300, "int_value": 0}}`. A bucket matches
/// `floor <= v < ceiling`; a missing bound is open.
#[derive(Debug, Clone, PartialEq)]
pub struct MapBucket {
    pub label: String,
    pub floor: Option<f64>,
    pub ceiling: Option<f64>,
    pub int_value: i64,
}

impl MapBucket {
    /// Whether the bucket's range contains the value.
    pub fn contains(&self, value: f64) -> bool {
        let floor = self.floor.unwrap_or(f64::NEG_INFINITY);
        let ceiling = self.ceiling.unwrap_or(f64::INFINITY);
        floor <= value && value < ceiling
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BucketBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    floor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ceiling: Option<f64>,
    int_value: i64,
}

impl<'de> Deserialize<'de> for MapBucket {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = IndexMap::<String, BucketBounds>::deserialize(deserializer)?;
        if entries.len() != 1 {
            return Err(D::Error::custom("bucket must be a single-entry object keyed by its label"));
        }
        let (label, bounds) = entries.into_iter().next().expect("length checked");
        Ok(MapBucket {
            label,
            floor: bounds.floor,
            ceiling: bounds.ceiling,
            int_value: bounds.int_value,
        })
    }
}

impl Serialize for MapBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut entries = IndexMap::new();
        entries.insert(
            self.label.clone(),
            BucketBounds {
                floor: self.floor,
                ceiling: self.ceiling,
                int_value: self.int_value,
            },
        );
        entries.serialize(serializer)
    }
}

/// One `if`/`then` clause of a conditional rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clause {
    /// Per-column predicates; all must hold for the clause to match.
    #[serde(rename = "if")]
    pub conditions: IndexMap<String, Predicate>,

    pub then: Outcome,
}

/// A per-column predicate. Both bounds are strict inequalities; when
/// both are present both must hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predicate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greater_than: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub less_than: Option<f64>,
}

impl Predicate {
    /// Evaluate against a numeric value.
    pub fn holds(&self, value: f64) -> bool {
        if let Some(gt) = self.greater_than {
            if !(value > gt) {
                return false;
            }
        }
        if let Some(lt) = self.less_than {
            if !(value < lt) {
                return false;
            }
        }
        true
    }
}

/// The coded value and human label a matching clause (or the default)
/// assigns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub value: f64,
    pub label: String,
}

// =============================================================================
// Loading and validation
// =============================================================================

impl PipelineConfig {
    /// Parse a configuration document from JSON text.
    ///
    /// Runs the embedded-schema check first (better messages than serde
    /// for structural problems), then typed parsing, then
    /// [`Self::validate`].
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let raw: Value = serde_json::from_str(json)?;
        check_schema(&raw)?;
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Serialize back to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Reject rule-level problems the schema cannot express.
    ///
    /// Dataset column existence is deliberately *not* checked here; those
    /// failures surface at transform time with row/column context.
    pub fn validate(&self) -> ConfigResult<()> {
        let cleansing = &self.data.data_cleansing;
        for rule in &cleansing.aggregate {
            if rule.column_mapping.is_empty() {
                return Err(ConfigError::InvalidRule {
                    name: rule.aggregate_column.clone(),
                    message: "aggregation rule needs at least one column mapping".into(),
                });
            }
        }

        for (column, rule) in &self.data.data_fitting {
            match rule {
                FitRule::Policy(FitPolicy::Calc) => {
                    return Err(ConfigError::InvalidRule {
                        name: column.clone(),
                        message: "'calc' requires a spec object with first_input/operator/second_input/unit".into(),
                    });
                }
                FitRule::Policy(_) => {}
                FitRule::Calc(spec) => {
                    if spec.operator != "-" {
                        return Err(ConfigError::InvalidRule {
                            name: column.clone(),
                            message: format!("unsupported operator '{}' (only '-')", spec.operator),
                        });
                    }
                    if !spec.unit.eq_ignore_ascii_case("month") {
                        return Err(ConfigError::InvalidRule {
                            name: column.clone(),
                            message: format!("unsupported unit '{}' (only 'month')", spec.unit),
                        });
                    }
                }
            }
        }

        let rules = &self.data.data_derivation.columns;
        for (idx, rule) in rules.iter().enumerate() {
            if rules[..idx].iter().any(|r| r.name() == rule.name()) {
                return Err(ConfigError::InvalidRule {
                    name: rule.name().to_string(),
                    message: "duplicate derived column name".into(),
                });
            }

            // A rule may read columns derived before it, never after.
            for reference in rule.reads() {
                if rules[idx + 1..].iter().any(|later| later.name() == reference) {
                    return Err(ConfigError::ForwardReference {
                        rule: rule.name().to_string(),
                        reference: reference.to_string(),
                    });
                }
            }

            match rule {
                DeriveRule::Mapping { name, map, .. } => {
                    if map.is_empty() {
                        return Err(ConfigError::InvalidRule {
                            name: name.clone(),
                            message: "mapping rule needs at least one bucket".into(),
                        });
                    }
                }
                DeriveRule::Conditional { name, rules: clauses, .. } => {
                    for clause in clauses {
                        for (column, pred) in &clause.conditions {
                            if pred.greater_than.is_none() && pred.less_than.is_none() {
                                return Err(ConfigError::InvalidRule {
                                    name: name.clone(),
                                    message: format!(
                                        "predicate on '{}' needs greater_than or less_than",
                                        column
                                    ),
                                });
                            }
                        }
                    }
                }
                DeriveRule::Count { .. } => {}
            }
        }

        Ok(())
    }
}

/// Validate the raw document against the embedded draft-7 schema.
fn check_schema(raw: &Value) -> ConfigResult<()> {
    let schema: Value = serde_json::from_str(include_str!("../../schemas/pipeline-config.schema.json"))
        .expect("Invalid embedded schema");
    let validator = jsonschema::draft7::new(&schema)
        .map_err(|e| ConfigError::SchemaError { errors: vec![e.to_string()] })?;

    let errors: Vec<String> = validator.iter_errors(raw).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::SchemaError { errors })
    }
}

// =============================================================================
// Example configuration
// =============================================================================

/// An example document covering every rule kind, used by docs, tests and
/// the `example-config` CLI command.
pub fn example_config() -> PipelineConfig {
    let json = r#"{
  "data": {
    "data_cleansing": {
      "id_column": "UR",
      "aggregate": [
        {
          "aggregate_column": "Gene",
          "skip_empty": true,
          "column_mapping": [
            { "old_name": "Gene", "new_name": "name" },
            { "old_name": "VAF% G1", "new_name": "VAF% G1" },
            { "old_name": "Tier", "new_name": "Tier" },
            { "old_name": "Variant description", "new_name": "Variant description" }
          ]
        }
      ]
    },
    "data_fitting": {
      "Dx OS": {
        "first_input": "Date last FollowUp (or death)",
        "operator": "-",
        "second_input": "Date AML dx",
        "unit": "month"
      },
      "Ferritin": "median",
      "TF Sats": "median",
      "BM Iron stores": "drop"
    },
    "data_derivation": {
      "columns": [
        {
          "name": "Gene Count",
          "base_column": "Gene",
          "method": "Count"
        },
        {
          "name": "Ferritin Class",
          "base_column": "Ferritin",
          "method": "mapping",
          "map": [
            { "normal": { "ceiling": 300, "int_value": 0 } },
            { "inflammatory": { "floor": 300, "ceiling": 1000, "int_value": 1 } },
            { "overload": { "floor": 1000, "int_value": 2 } }
          ]
        },
        {
          "name": "Serum Iron Class",
          "method": "conditional",
          "rules": [
            {
              "if": {
                "TF Sats": { "greater_than": 45 },
                "Ferritin": { "greater_than": 200 }
              },
              "then": { "value": 2, "label": "overload" }
            },
            {
              "if": {
                "TF Sats": { "less_than": 20 },
                "Ferritin": { "less_than": 100 }
              },
              "then": { "value": 1, "label": "deficiency" }
            }
          ],
          "default": { "value": 0, "label": "normal" }
        }
      ]
    }
  }
}"#;
    PipelineConfig::from_json(json).expect("example config must be valid")
}

// =============================================================================
// Tests
// =============================================================================
