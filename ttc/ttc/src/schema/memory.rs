use std::collections::HashMap;
use std::sync::Arc;

use ttc_parser::ast::{ClassDef, Dataset, FunctionDef, FunctionType, Input};
use ttc_parser::Error;

use super::{not_found_error, ClassFlags, SchemaRetriever};

/// A retriever over class definitions loaded from surface-syntax manifests.
/// This is what every test uses; production deployments wrap a transport to
/// the remote catalogue instead.
#[derive(Default)]
pub struct MemorySchemaRetriever {
    classes: HashMap<String, Arc<ClassDef>>,
    functions: HashMap<(String, String, FunctionType), Arc<FunctionDef>>,
    datasets: Vec<Dataset>,
}

impl MemorySchemaRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `class @kind { ... }` / `dataset @kind { ... }` manifest and
    /// register its contents.
    pub fn load_manifest(&mut self, source: &str) -> Result<(), Vec<Error>> {
        let input = ttc_parser::parse_source(source, 0)?;
        match input {
            Input::Library(library) => {
                for class in library.classes {
                    self.add_class(class);
                }
                self.datasets.extend(library.datasets);
                Ok(())
            }
            _ => Err(vec![Error::new_simple(
                ttc_parser::ErrorKind::Parse,
                "expected a library of classes and datasets",
            )]),
        }
    }

    pub fn add_class(&mut self, class: ClassDef) {
        for def in class.queries.values() {
            self.functions.insert(
                (class.kind.clone(), def.name.clone(), FunctionType::Query),
                Arc::new(def.clone()),
            );
        }
        for def in class.actions.values() {
            self.functions.insert(
                (class.kind.clone(), def.name.clone(), FunctionType::Action),
                Arc::new(def.clone()),
            );
        }
        self.classes.insert(class.kind.clone(), Arc::new(class));
    }
}

impl SchemaRetriever for MemorySchemaRetriever {
    async fn get_function(
        &self,
        kind: &str,
        name: &str,
        function_type: FunctionType,
    ) -> Result<Arc<FunctionDef>, Error> {
        self.functions
            .get(&(kind.to_string(), name.to_string(), function_type))
            .cloned()
            .ok_or_else(|| not_found_error(function_type.as_ref(), &format!("{kind}.{name}")))
    }

    async fn get_class(&self, kind: &str, _flags: ClassFlags) -> Result<Arc<ClassDef>, Error> {
        self.classes
            .get(kind)
            .cloned()
            .ok_or_else(|| not_found_error("class", kind))
    }

    async fn get_examples_by_kinds(&self, kinds: &[String]) -> Result<Dataset, Error> {
        let mut merged = Dataset {
            name: kinds.join("+"),
            language: "en".to_string(),
            examples: Vec::new(),
            annotations: Default::default(),
        };
        for dataset in &self.datasets {
            if kinds.contains(&dataset.name) {
                merged.examples.extend(dataset.examples.iter().cloned());
            }
        }
        Ok(merged)
    }
}
