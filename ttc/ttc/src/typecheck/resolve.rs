//! Pass one of typechecking: walk the AST, enqueue schema requests, resolve
//! them (possibly in parallel) and populate the invocations' schemas. This
//! keeps all suspension points out of the checking pass.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ttc_parser::ast::fold::{self, AstFold};
use ttc_parser::ast::*;
use ttc_parser::ty::units;
use ttc_parser::Error;

use super::TypecheckOptions;
use crate::schema::SchemaRetriever;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SchemaKey {
    pub kind: String,
    pub channel: String,
    pub function_type: FunctionType,
}

impl SchemaKey {
    pub(crate) fn new(kind: &str, channel: &str, function_type: FunctionType) -> Self {
        SchemaKey {
            kind: kind.to_string(),
            channel: channel.to_string(),
            function_type,
        }
    }
}

/// Fetch outcomes, keyed by request. Fetch failures are kept and reported
/// with a source span during checking.
pub(crate) type SchemaMap = HashMap<SchemaKey, Result<Arc<FunctionDef>, Error>>;

/// Collect the distinct schema requests an input needs.
pub(crate) fn collect_requests(input: Input) -> (Input, Vec<SchemaKey>) {
    let mut collector = Collector::default();
    // the collector introduces no errors
    let input = collector.fold_input(input).unwrap();
    let mut requests: Vec<_> = collector.requests.into_iter().collect();
    requests.sort_by(|a, b| {
        (&a.kind, &a.channel, a.function_type.as_ref())
            .cmp(&(&b.kind, &b.channel, b.function_type.as_ref()))
    });
    (input, requests)
}

/// Issue all requests concurrently against the retriever, racing the
/// cancellation token. Requests for independent functions proceed in
/// parallel; the retriever's cache coalesces duplicates.
pub(crate) async fn fetch_schemas<R: SchemaRetriever>(
    requests: Vec<SchemaKey>,
    retriever: &R,
    options: &TypecheckOptions,
) -> Result<SchemaMap, Error> {
    if options.token.is_cancelled() {
        return Err(Error::cancelled());
    }

    let fetches = futures::future::join_all(requests.iter().map(|key| {
        retriever.get_function(&key.kind, &key.channel, key.function_type)
    }));

    let results = tokio::select! {
        _ = options.token.cancelled() => return Err(Error::cancelled()),
        results = fetches => results,
    };

    log::debug!("resolved {} schema requests", requests.len());
    Ok(requests.into_iter().zip(results).collect())
}

/// Install fetched schemas into the AST and resolve `defaultTemperature`
/// against the user's preferred unit.
pub(crate) fn install_schemas(
    input: Input,
    schemas: &SchemaMap,
    options: &TypecheckOptions,
) -> Input {
    let mut installer = Installer { schemas, options };
    // the installer introduces no errors
    installer.fold_input(input).unwrap()
}

#[derive(Default)]
struct Collector {
    requests: HashSet<SchemaKey>,
    permission_side: Option<FunctionType>,
}

impl AstFold for Collector {
    fn fold_table_kind(&mut self, kind: TableKind) -> Result<TableKind, Error> {
        match &kind {
            TableKind::Invocation(inv) => {
                self.requests.insert(SchemaKey::new(
                    &inv.selector.kind,
                    &inv.channel,
                    FunctionType::Query,
                ));
            }
            TableKind::History { kind, channel, .. } => {
                self.requests
                    .insert(SchemaKey::new(kind, channel, FunctionType::Query));
            }
            _ => {}
        }
        fold::fold_table_kind(self, kind)
    }

    fn fold_action(&mut self, action: Action) -> Result<Action, Error> {
        if let Action::Invocation(inv) = &action {
            self.requests.insert(SchemaKey::new(
                &inv.selector.kind,
                &inv.channel,
                FunctionType::Action,
            ));
        }
        match action {
            Action::Notify(kind) => Ok(Action::Notify(kind)),
            Action::Invocation(inv) => Ok(Action::Invocation(self.fold_invocation(inv)?)),
        }
    }

    fn fold_declaration(&mut self, decl: Declaration) -> Result<Declaration, Error> {
        if let DeclarationValue::Action(inv) = &decl.value {
            self.requests.insert(SchemaKey::new(
                &inv.selector.kind,
                &inv.channel,
                FunctionType::Action,
            ));
        }
        fold::fold_declaration(self, decl)
    }

    fn fold_filter(&mut self, filter: BooleanExpression) -> Result<BooleanExpression, Error> {
        if let BooleanExpression::External(e) = &filter {
            self.requests.insert(SchemaKey::new(
                &e.invocation.selector.kind,
                &e.invocation.channel,
                FunctionType::Query,
            ));
        }
        fold::fold_filter(self, filter)
    }

    fn fold_permission_rule(&mut self, rule: PermissionRule) -> Result<PermissionRule, Error> {
        let principal = self.fold_filter(rule.principal)?;
        self.permission_side = Some(FunctionType::Query);
        let query = self.fold_permission_function(rule.query)?;
        self.permission_side = Some(FunctionType::Action);
        let action = self.fold_permission_function(rule.action)?;
        self.permission_side = None;
        Ok(PermissionRule {
            principal,
            query,
            action,
            span: rule.span,
        })
    }

    fn fold_permission_function(
        &mut self,
        function: PermissionFunction,
    ) -> Result<PermissionFunction, Error> {
        if let PermissionFunction::Specified { kind, channel, .. } = &function {
            let function_type = self.permission_side.unwrap_or(FunctionType::Query);
            self.requests
                .insert(SchemaKey::new(kind, channel, function_type));
        }
        fold::fold_permission_function(self, function)
    }
}

struct Installer<'a> {
    schemas: &'a SchemaMap,
    options: &'a TypecheckOptions,
}

impl Installer<'_> {
    fn lookup(&self, kind: &str, channel: &str, ft: FunctionType) -> Option<Arc<FunctionDef>> {
        self.schemas
            .get(&SchemaKey::new(kind, channel, ft))
            .and_then(|r| r.as_ref().ok())
            .cloned()
    }
}

impl AstFold for Installer<'_> {
    fn fold_table_kind(&mut self, kind: TableKind) -> Result<TableKind, Error> {
        let kind = fold::fold_table_kind(self, kind)?;
        Ok(match kind {
            TableKind::Invocation(mut inv) => {
                inv.schema =
                    self.lookup(&inv.selector.kind, &inv.channel, FunctionType::Query);
                TableKind::Invocation(inv)
            }
            other => other,
        })
    }

    fn fold_action(&mut self, action: Action) -> Result<Action, Error> {
        Ok(match action {
            Action::Notify(kind) => Action::Notify(kind),
            Action::Invocation(inv) => {
                let mut inv = self.fold_invocation(inv)?;
                inv.schema =
                    self.lookup(&inv.selector.kind, &inv.channel, FunctionType::Action);
                Action::Invocation(inv)
            }
        })
    }

    fn fold_declaration(&mut self, decl: Declaration) -> Result<Declaration, Error> {
        let mut decl = fold::fold_declaration(self, decl)?;
        if let DeclarationValue::Action(inv) = &mut decl.value {
            inv.schema = self.lookup(&inv.selector.kind, &inv.channel, FunctionType::Action);
        }
        Ok(decl)
    }

    fn fold_filter(&mut self, filter: BooleanExpression) -> Result<BooleanExpression, Error> {
        let filter = fold::fold_filter(self, filter)?;
        Ok(match filter {
            BooleanExpression::External(mut e) => {
                e.invocation.schema = self.lookup(
                    &e.invocation.selector.kind,
                    &e.invocation.channel,
                    FunctionType::Query,
                );
                BooleanExpression::External(e)
            }
            other => other,
        })
    }

    fn fold_permission_rule(&mut self, rule: PermissionRule) -> Result<PermissionRule, Error> {
        let install = |pf: PermissionFunction, ft: FunctionType, this: &mut Self| {
            Ok(match this.fold_permission_function(pf)? {
                PermissionFunction::Specified {
                    kind,
                    channel,
                    filter,
                    ..
                } => {
                    let schema = this.lookup(&kind, &channel, ft);
                    PermissionFunction::Specified {
                        kind,
                        channel,
                        filter,
                        schema,
                    }
                }
                other => other,
            })
        };
        Ok(PermissionRule {
            principal: self.fold_filter(rule.principal)?,
            query: install(rule.query, FunctionType::Query, self)?,
            action: install(rule.action, FunctionType::Action, self)?,
            span: rule.span,
        })
    }

    fn fold_value_kind(&mut self, kind: ValueKind) -> Result<ValueKind, Error> {
        let kind = fold::fold_value_kind(self, kind)?;
        Ok(match kind {
            // the pseudo-unit resolves to the locale's preferred unit
            ValueKind::Measure { value, unit } if unit == units::DEFAULT_TEMPERATURE => {
                ValueKind::Measure {
                    value,
                    unit: self.options.temperature_unit.clone(),
                }
            }
            other => other,
        })
    }
}
