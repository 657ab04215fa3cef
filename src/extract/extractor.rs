//! Statement dispatch and edge assembly.
//!
//! One statement in, one [`Extraction`] out: the target object, the nodes it
//! touches, and deduplicated dependency edges. Handled forms are CREATE TABLE
//! AS SELECT, CREATE [MATERIALIZED] VIEW, INSERT ... SELECT, MERGE, and
//! UPDATE. Everything else parses but yields `UnsupportedStatement`.

use std::collections::HashMap;

use sqlparser::ast::{
    Assignment, AssignmentTarget, Expr, Ident, Insert, MergeAction, MergeClause, MergeInsertKind,
    Query, SetExpr, Statement, TableFactor, TableWithJoins,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::extract::scope::{
    qualify_object, ColumnDeps, QueryShape, RelEntry, Relation, ResolvedRef, Resolver,
};
use crate::extract::{
    Candidate, ExtractError, ExtractResult, ExtractedEdge, Extraction, ExtractorConfig, NodeRef,
    ObjectCatalog,
};
use crate::graph::model::{ObjectId, ObjectType, TransformationKind};

// ============================================================================
// Entry points
// ============================================================================

/// Extract column dependencies from one candidate statement.
///
/// The first handled statement in the text wins; multi-statement batches
/// are otherwise rare in query history feeds.
pub fn extract(
    candidate: &Candidate,
    catalog: &ObjectCatalog,
    config: &ExtractorConfig,
) -> ExtractResult<Extraction> {
    let statements = Parser::parse_sql(&GenericDialect {}, &candidate.statement_text)
        .map_err(|err| ExtractError::Parse {
            reason: err.to_string(),
        })?;

    let resolver = Resolver {
        catalog,
        config,
        default_database: candidate.default_database.clone(),
        default_schema: candidate.default_schema.clone(),
    };

    let mut first_kind: Option<String> = None;
    for statement in &statements {
        if let Some(extraction) = extract_statement(statement, &resolver)? {
            return Ok(extraction);
        }
        if first_kind.is_none() {
            first_kind = Some(statement_name(statement));
        }
    }
    Err(ExtractError::UnsupportedStatement(
        first_kind.unwrap_or_else(|| "empty input".to_string()),
    ))
}

/// Record column lists from plain CREATE TABLE statements into the catalog.
/// Parse failures and other statement forms are ignored.
pub fn learn_schema(
    sql: &str,
    default_database: Option<&str>,
    default_schema: Option<&str>,
    catalog: &mut ObjectCatalog,
) {
    let statements = match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) => statements,
        Err(_) => return,
    };
    for statement in statements {
        if let Statement::CreateTable(create) = statement {
            if create.query.is_none() && !create.columns.is_empty() {
                let object = qualify_object(&create.name, default_database, default_schema);
                let columns = create
                    .columns
                    .iter()
                    .map(|c| c.name.value.to_lowercase())
                    .collect();
                catalog.record(object, columns);
            }
        }
    }
}

// ============================================================================
// Statement handlers
// ============================================================================

fn extract_statement(
    statement: &Statement,
    resolver: &Resolver,
) -> ExtractResult<Option<Extraction>> {
    match statement {
        Statement::CreateTable(create) => match &create.query {
            Some(query) => {
                let explicit: Vec<String> = create
                    .columns
                    .iter()
                    .map(|c| c.name.value.to_lowercase())
                    .collect();
                extract_query_into(
                    resolver,
                    resolver.qualify(&create.name),
                    ObjectType::Table,
                    explicit,
                    query,
                    "create_table_as_select",
                    true,
                )
                .map(Some)
            }
            None => Ok(None),
        },
        Statement::CreateView {
            name,
            columns,
            query,
            materialized,
            ..
        } => {
            let target_type = if *materialized {
                ObjectType::MaterializedView
            } else {
                ObjectType::View
            };
            let explicit: Vec<String> = columns
                .iter()
                .map(|c| c.name.value.to_lowercase())
                .collect();
            extract_query_into(
                resolver,
                resolver.qualify(name),
                target_type,
                explicit,
                query,
                "create_view",
                true,
            )
            .map(Some)
        }
        Statement::Insert(insert) => extract_insert(insert, resolver).map(Some),
        Statement::Merge {
            table,
            source,
            on,
            clauses,
            ..
        } => extract_merge(table, source, on, clauses, resolver),
        Statement::Update {
            table,
            assignments,
            from,
            selection,
            ..
        } => extract_update(table, assignments, from.as_ref(), selection.as_ref(), resolver),
        _ => Ok(None),
    }
}

fn extract_insert(insert: &Insert, resolver: &Resolver) -> ExtractResult<Extraction> {
    let target = resolver.qualify(&insert.table_name);
    let source_query = insert
        .source
        .as_deref()
        .filter(|q| !matches!(q.body.as_ref(), SetExpr::Values(_)));
    match source_query {
        Some(query) => {
            let explicit = ident_names(&insert.columns);
            extract_query_into(
                resolver,
                target,
                ObjectType::Table,
                explicit,
                query,
                "insert_select",
                false,
            )
        }
        None => {
            // Plain VALUES: the write is real but carries no column lineage.
            let nodes = vec![NodeRef {
                id: target.clone(),
                object_type: ObjectType::Table,
            }];
            Ok(Extraction {
                target_object: target,
                nodes,
                edges: Vec::new(),
                parse_method: "insert_values",
                learned_columns: None,
            })
        }
    }
}

fn extract_merge(
    table: &TableFactor,
    source: &TableFactor,
    on: &Expr,
    clauses: &[MergeClause],
    resolver: &Resolver,
) -> ExtractResult<Option<Extraction>> {
    let (target_object, target_key) = match table {
        TableFactor::Table { name, alias, .. } => {
            let key = alias
                .as_ref()
                .map(|a| a.name.value.to_lowercase())
                .or_else(|| name.0.last().map(|ident| ident.value.to_lowercase()));
            (resolver.qualify(name), key)
        }
        _ => return Ok(None),
    };

    let ctes = HashMap::new();
    let mut relations = vec![RelEntry {
        key: target_key,
        relation: Relation::Base(target_object.clone()),
    }];
    let mut predicates: Vec<ResolvedRef> = Vec::new();
    resolver.push_relation(source, &ctes, &mut relations, &mut predicates)?;
    resolver.collect_predicate(on, &relations, TransformationKind::Join, &mut predicates);

    let mut asm = Assembly::new(target_object, ObjectType::Table);
    for clause in clauses {
        if let Some(predicate) = &clause.predicate {
            resolver.collect_predicate(
                predicate,
                &relations,
                TransformationKind::Filter,
                &mut predicates,
            );
        }
        match &clause.action {
            MergeAction::Update { assignments } => {
                for assignment in assignments {
                    let deps = resolver.classify_expr(&assignment.value, &relations, &ctes);
                    for column in assignment_columns(&assignment.target) {
                        asm.value_edges(&deps, Some(column.as_str()));
                    }
                }
            }
            MergeAction::Insert(insert) => match &insert.kind {
                MergeInsertKind::Values(values) => {
                    if let Some(row) = values.rows.first() {
                        for (ident, expr) in insert.columns.iter().zip(row) {
                            let deps = resolver.classify_expr(expr, &relations, &ctes);
                            let column = ident.value.to_lowercase();
                            asm.value_edges(&deps, Some(column.as_str()));
                        }
                    }
                }
                MergeInsertKind::Row => {
                    // INSERT ROW lands the whole source row; degrade to the
                    // source relation's objects.
                    if let Some(entry) = relations.get(1) {
                        let config = resolver.config;
                        match &entry.relation {
                            Relation::Base(object) => asm.object_edge(
                                object,
                                None,
                                TransformationKind::Unknown,
                                config.wildcard_unknown,
                            ),
                            Relation::Virtual(rel) => {
                                for object in &rel.source_objects {
                                    asm.object_edge(
                                        object,
                                        None,
                                        TransformationKind::Unknown,
                                        config.wildcard_unknown,
                                    );
                                }
                            }
                        }
                    }
                }
            },
            MergeAction::Delete => {}
        }
    }
    asm.predicate_edges(&predicates);
    Ok(Some(asm.finish("merge", None)))
}

fn extract_update(
    table: &TableWithJoins,
    assignments: &[Assignment],
    from: Option<&TableWithJoins>,
    selection: Option<&Expr>,
    resolver: &Resolver,
) -> ExtractResult<Option<Extraction>> {
    let target_object = match &table.relation {
        TableFactor::Table { name, .. } => resolver.qualify(name),
        _ => return Ok(None),
    };

    let ctes = HashMap::new();
    let mut relations: Vec<RelEntry> = Vec::new();
    let mut predicates: Vec<ResolvedRef> = Vec::new();
    resolver.collect_relations(table, &ctes, &mut relations, &mut predicates)?;
    if let Some(from) = from {
        resolver.collect_relations(from, &ctes, &mut relations, &mut predicates)?;
    }
    if let Some(selection) = selection {
        resolver.collect_predicate(
            selection,
            &relations,
            TransformationKind::Filter,
            &mut predicates,
        );
    }

    let mut asm = Assembly::new(target_object, ObjectType::Table);
    for assignment in assignments {
        let deps = resolver.classify_expr(&assignment.value, &relations, &ctes);
        for column in assignment_columns(&assignment.target) {
            asm.value_edges(&deps, Some(column.as_str()));
        }
    }
    asm.predicate_edges(&predicates);
    Ok(Some(asm.finish("update", None)))
}

/// Shared path for statements that pour a query into a target: pair the
/// query's output columns with the target's column list positionally.
/// `defines_target` is true for CREATE forms, where the statement itself
/// names the target's columns.
fn extract_query_into(
    resolver: &Resolver,
    target_object: ObjectId,
    target_type: ObjectType,
    explicit_columns: Vec<String>,
    query: &Query,
    parse_method: &'static str,
    defines_target: bool,
) -> ExtractResult<Extraction> {
    let shape = resolver.analyze_query(query, &HashMap::new())?;
    let config = resolver.config;
    let mut asm = Assembly::new(target_object.clone(), target_type);
    let mut learned_columns = None;

    if !shape.wildcard_objects.is_empty() {
        // An unexpandable wildcard makes positions unreliable; degrade the
        // whole statement to object-level UNKNOWN dependencies.
        let known_targets: Vec<String> = if !explicit_columns.is_empty() {
            explicit_columns
        } else if !defines_target {
            resolver
                .catalog
                .columns(&target_object)
                .map(<[String]>::to_vec)
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        for object in dedup_objects(&shape.wildcard_objects) {
            if known_targets.is_empty() {
                asm.object_edge(
                    &object,
                    None,
                    TransformationKind::Unknown,
                    config.wildcard_unknown,
                );
            } else {
                for column in &known_targets {
                    asm.object_edge(
                        &object,
                        Some(column.as_str()),
                        TransformationKind::Unknown,
                        config.wildcard_unknown,
                    );
                }
            }
        }
    } else {
        let target_columns =
            target_column_names(&explicit_columns, &shape, resolver, &target_object, defines_target);
        if defines_target {
            let names: Vec<String> = target_columns.iter().flatten().cloned().collect();
            if !names.is_empty() && names.len() == target_columns.len() {
                learned_columns = Some((target_object.clone(), names));
            }
        }
        for (i, (_, deps)) in shape.columns.iter().enumerate() {
            let column = target_columns.get(i).cloned().flatten();
            asm.value_edges(deps, column.as_deref());
        }
    }

    asm.predicate_edges(&shape.predicates);
    Ok(asm.finish(parse_method, learned_columns))
}

/// Target column for each projection position: explicit list first, then the
/// catalog for existing tables, then the projection's own names.
fn target_column_names(
    explicit: &[String],
    shape: &QueryShape,
    resolver: &Resolver,
    target_object: &ObjectId,
    defines_target: bool,
) -> Vec<Option<String>> {
    if !explicit.is_empty() {
        return explicit.iter().map(|c| Some(c.clone())).collect();
    }
    if !defines_target {
        if let Some(known) = resolver.catalog.columns(target_object) {
            return known.iter().map(|c| Some(c.clone())).collect();
        }
    }
    shape
        .columns
        .iter()
        .enumerate()
        .map(|(i, (name, _))| match name {
            Some(name) => Some(name.clone()),
            None if defines_target => Some(format!("col_{}", i + 1)),
            None => None,
        })
        .collect()
}

// ============================================================================
// Assembly
// ============================================================================

/// Accumulates nodes and edges for one extraction; the target object node is
/// seeded first so its stated type wins.
struct Assembly {
    target_object: ObjectId,
    nodes: Vec<NodeRef>,
    edges: Vec<ExtractedEdge>,
}

impl Assembly {
    fn new(target_object: ObjectId, target_type: ObjectType) -> Self {
        let nodes = vec![NodeRef {
            id: target_object.clone(),
            object_type: target_type,
        }];
        Self {
            target_object,
            nodes,
            edges: Vec::new(),
        }
    }

    fn add_node(&mut self, id: ObjectId, object_type: ObjectType) {
        if !self.nodes.iter().any(|n| n.id == id) {
            self.nodes.push(NodeRef { id, object_type });
        }
    }

    fn target_id(&mut self, column: Option<&str>) -> ObjectId {
        match column {
            Some(column) => {
                let id = self.target_object.column(column);
                self.add_node(id.clone(), ObjectType::Column);
                id
            }
            None => self.target_object.clone(),
        }
    }

    fn source_id(&mut self, r: &ResolvedRef) -> ObjectId {
        self.add_node(r.object.clone(), ObjectType::Table);
        match &r.column {
            Some(column) => {
                let id = r.object.column(column);
                self.add_node(id.clone(), ObjectType::Column);
                id
            }
            None => r.object.clone(),
        }
    }

    /// One value edge per resolved dependency of a projected column.
    fn value_edges(&mut self, deps: &ColumnDeps, target_column: Option<&str>) {
        let target = self.target_id(target_column);
        for r in &deps.refs {
            let source = self.source_id(r);
            self.edges.push(ExtractedEdge {
                source,
                target: target.clone(),
                kind: r.kind,
                confidence: r.confidence,
            });
        }
    }

    fn object_edge(
        &mut self,
        source: &ObjectId,
        target_column: Option<&str>,
        kind: TransformationKind,
        confidence: f64,
    ) {
        self.add_node(source.clone(), ObjectType::Table);
        let target = self.target_id(target_column);
        self.edges.push(ExtractedEdge {
            source: source.clone(),
            target,
            kind,
            confidence,
        });
    }

    /// Predicate refs attach to every target that received a value edge.
    fn predicate_edges(&mut self, predicates: &[ResolvedRef]) {
        let mut targets: Vec<ObjectId> = Vec::new();
        for edge in &self.edges {
            if !targets.contains(&edge.target) {
                targets.push(edge.target.clone());
            }
        }
        for r in predicates {
            let source = self.source_id(r);
            for target in &targets {
                self.edges.push(ExtractedEdge {
                    source: source.clone(),
                    target: target.clone(),
                    kind: r.kind,
                    confidence: r.confidence,
                });
            }
        }
    }

    fn finish(
        self,
        parse_method: &'static str,
        learned_columns: Option<(ObjectId, Vec<String>)>,
    ) -> Extraction {
        Extraction {
            target_object: self.target_object,
            nodes: self.nodes,
            edges: dedup_edges(self.edges),
            parse_method,
            learned_columns,
        }
    }
}

fn dedup_edges(edges: Vec<ExtractedEdge>) -> Vec<ExtractedEdge> {
    let mut out: Vec<ExtractedEdge> = Vec::new();
    for edge in edges {
        match out
            .iter_mut()
            .find(|e| e.source == edge.source && e.target == edge.target && e.kind == edge.kind)
        {
            Some(have) => {
                if edge.confidence > have.confidence {
                    have.confidence = edge.confidence;
                }
            }
            None => out.push(edge),
        }
    }
    out
}

fn dedup_objects(objects: &[ObjectId]) -> Vec<ObjectId> {
    let mut out: Vec<ObjectId> = Vec::new();
    for object in objects {
        if !out.contains(object) {
            out.push(object.clone());
        }
    }
    out
}

fn ident_names(idents: &[Ident]) -> Vec<String> {
    idents.iter().map(|ident| ident.value.to_lowercase()).collect()
}

fn assignment_columns(target: &AssignmentTarget) -> Vec<String> {
    match target {
        AssignmentTarget::ColumnName(name) => name
            .0
            .last()
            .map(|ident| vec![ident.value.to_lowercase()])
            .unwrap_or_default(),
        AssignmentTarget::Tuple(names) => names
            .iter()
            .filter_map(|name| name.0.last().map(|ident| ident.value.to_lowercase()))
            .collect(),
    }
}

fn statement_name(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("EMPTY")
        .to_uppercase()
}

// ============================================================================
// Tests
// ============================================================================
