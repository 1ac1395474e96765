//! Domain profiles: the table, columns, and label stages of one product catalog.

use crate::features::FeatureConfig;
use crate::labeling::{KeywordLists, Polarity};
use crate::store::{LabelTarget, StoreError};

/// One binary label column and everything needed to train and apply it.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelStage {
    /// Short stage name used on the command line, e.g. `food`.
    pub name: String,
    pub label_column: String,
    /// Column that must equal 1 before this stage reads or writes a row.
    pub prerequisite: Option<String>,
    pub keywords: KeywordLists,
    pub polarity: Polarity,
    pub features: FeatureConfig,
}

impl LabelStage {
    pub fn food(label_column: &str) -> Self {
        Self {
            name: "food".to_string(),
            label_column: label_column.to_string(),
            prerequisite: None,
            keywords: KeywordLists::homeshopping_food(),
            polarity: Polarity::DOMINANT_NEGATIVE,
            features: FeatureConfig::food(),
        }
    }

    pub fn ingredient(label_column: &str, keywords: KeywordLists) -> Self {
        Self {
            name: "ingredient".to_string(),
            label_column: label_column.to_string(),
            prerequisite: None,
            keywords,
            polarity: Polarity::DOMINANT_NEGATIVE,
            features: FeatureConfig::ingredient(),
        }
    }

    pub fn gated_on(mut self, prerequisite: &str) -> Self {
        self.prerequisite = Some(prerequisite.to_string());
        self
    }
}

/// Parameter set specializing the pipeline to one catalog table.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainProfile {
    pub name: String,
    pub table: String,
    pub id_column: String,
    pub name_column: String,
    /// Stages in execution order; gated stages follow their prerequisite.
    pub stages: Vec<LabelStage>,
}

impl DomainProfile {
    /// Home-shopping catalog: food flag first, then ingredient flag on food rows only.
    pub fn homeshopping() -> Self {
        Self {
            name: "homeshopping".to_string(),
            table: "HOMESHOPPING_CLASSIFY".to_string(),
            id_column: "PRODUCT_ID".to_string(),
            name_column: "PRODUCT_NAME".to_string(),
            stages: vec![
                LabelStage::food("CLS_FOOD"),
                LabelStage::ingredient("CLS_ING", KeywordLists::homeshopping_ingredient())
                    .gated_on("CLS_FOOD"),
            ],
        }
    }

    /// Marketplace catalog: ingredient flag only.
    pub fn kok() -> Self {
        Self {
            name: "kok".to_string(),
            table: "KOK_CLASSIFY".to_string(),
            id_column: "PRODUCT_ID".to_string(),
            name_column: "PRODUCT_NAME".to_string(),
            stages: vec![LabelStage::ingredient(
                "CLS_ING",
                KeywordLists::kok_ingredient(),
            )],
        }
    }

    pub fn builtins() -> Vec<Self> {
        vec![Self::homeshopping(), Self::kok()]
    }

    pub fn stage(&self, name: &str) -> Option<&LabelStage> {
        self.stages
            .iter()
            .find(|stage| stage.name.eq_ignore_ascii_case(name))
    }

    /// Validated store target for `stage`.
    pub fn target(&self, stage: &LabelStage) -> Result<LabelTarget, StoreError> {
        LabelTarget::new(
            &self.table,
            &self.id_column,
            &self.name_column,
            &stage.label_column,
            stage.prerequisite.as_deref(),
        )
    }

    /// Check identifiers and that every prerequisite is labeled by an earlier stage.
    pub fn validate(&self) -> Result<(), String> {
        if self.stages.is_empty() {
            return Err(format!("profile '{}' has no label stages", self.name));
        }
        for (index, stage) in self.stages.iter().enumerate() {
            self.target(stage).map_err(|err| err.to_string())?;
            if let Some(prerequisite) = &stage.prerequisite {
                let earlier = self.stages[..index]
                    .iter()
                    .any(|prior| prior.label_column.eq_ignore_ascii_case(prerequisite));
                if !earlier {
                    return Err(format!(
                        "stage '{}' of profile '{}' is gated on {prerequisite}, which no earlier stage labels",
                        stage.name, self.name
                    ));
                }
            }
            if self.stages[..index]
                .iter()
                .any(|prior| prior.name.eq_ignore_ascii_case(&stage.name))
            {
                return Err(format!(
                    "profile '{}' defines stage '{}' twice",
                    self.name, stage.name
                ));
            }
        }
        Ok(())
    }
}

/// Find the profile whose table (or profile name) matches `table`, ignoring ASCII case.
pub fn find_profile<'a>(profiles: &'a [DomainProfile], table: &str) -> Option<&'a DomainProfile> {
    profiles
        .iter()
        .find(|profile| profile.table.eq_ignore_ascii_case(table))
        .or_else(|| {
            profiles
                .iter()
                .find(|profile| profile.name.eq_ignore_ascii_case(table))
        })
}
