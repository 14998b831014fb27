//! Aggregation pipeline stages

use bson::{Bson, Document};

/// One pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    AddFields(Document),
    Project(Document),
    Match(Document),
    Group(Document),
    Sort(Document),
    Skip(u64),
    Limit(u64),
}

impl Stage {
    /// Stage operator name
    pub fn name(&self) -> &'static str {
        match self {
            Stage::AddFields(_) => "$addFields",
            Stage::Project(_) => "$project",
            Stage::Match(_) => "$match",
            Stage::Group(_) => "$group",
            Stage::Sort(_) => "$sort",
            Stage::Skip(_) => "$skip",
            Stage::Limit(_) => "$limit",
        }
    }

    /// Single-key document as sent to the store
    pub fn to_document(&self) -> Document {
        let body = match self {
            Stage::AddFields(d)
            | Stage::Project(d)
            | Stage::Match(d)
            | Stage::Group(d)
            | Stage::Sort(d) => Bson::Document(d.clone()),
            Stage::Skip(n) | Stage::Limit(n) => count_to_bson(*n),
        };
        let mut stage = Document::new();
        stage.insert(self.name(), body);
        stage
    }
}

fn count_to_bson(n: u64) -> Bson {
    Bson::Int64(i64::try_from(n).unwrap_or(i64::MAX))
}

/// Ordered list of stages
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in order
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// Stages as store documents
    pub fn to_documents(&self) -> Vec<Document> {
        self.stages.iter().map(Stage::to_document).collect()
    }
}
