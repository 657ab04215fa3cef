//! Name resolution for extraction.
//!
//! A statement's FROM clause is flattened into an ordered list of relations:
//! base objects, CTE references, and derived tables. CTEs and derived tables
//! are analyzed recursively into virtual relations whose output columns
//! already point at base-table columns, so a reference through any number of
//! layers substitutes down in one lookup. Kind composes to the strongest
//! transformation along the chain and confidence multiplies, floored at the
//! configured minimum.

use std::collections::HashMap;

use sqlparser::ast::{
    Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, JoinConstraint, JoinOperator,
    ObjectName, Query, Select, SelectItem, SetExpr, TableAliasColumnDef, TableFactor,
    TableWithJoins,
};

use crate::extract::{ExtractResult, ExtractorConfig, ObjectCatalog};
use crate::graph::model::{ObjectId, TransformationKind};

// ============================================================================
// Resolved forms
// ============================================================================

/// A reference resolved down to a base object, column-level when the column
/// is known and object-level when it is not.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedRef {
    pub object: ObjectId,
    pub column: Option<String>,
    pub kind: TransformationKind,
    pub confidence: f64,
}

/// Resolved dependencies of one projected column.
#[derive(Debug, Clone, Default)]
pub(crate) struct ColumnDeps {
    pub refs: Vec<ResolvedRef>,
}

/// A CTE or derived table reduced to its output columns.
#[derive(Debug, Clone)]
pub(crate) struct VirtualRel {
    /// Ordered output columns; projections without a derivable name keep
    /// `None` and are only reachable through wildcard expansion.
    pub columns: Vec<(Option<String>, ColumnDeps)>,
    /// Inner predicate refs that gate every row this relation yields.
    pub predicates: Vec<ResolvedRef>,
    /// Base objects feeding this relation, for degraded references.
    pub source_objects: Vec<ObjectId>,
    /// Unexpandable `SELECT *` sources inside this relation.
    pub wildcard_objects: Vec<ObjectId>,
}

/// What a name in a FROM clause resolves to.
#[derive(Debug, Clone)]
pub(crate) enum Relation {
    Base(ObjectId),
    Virtual(VirtualRel),
}

/// One entry in the flattened FROM clause.
#[derive(Debug, Clone)]
pub(crate) struct RelEntry {
    /// Alias or trailing table name, lowercased.
    pub key: Option<String>,
    pub relation: Relation,
}

/// The analyzed output shape of one query body.
#[derive(Debug, Clone, Default)]
pub(crate) struct QueryShape {
    pub columns: Vec<(Option<String>, ColumnDeps)>,
    /// Predicate refs with kind Filter or Join and confidence already applied.
    pub predicates: Vec<ResolvedRef>,
    pub wildcard_objects: Vec<ObjectId>,
}

impl QueryShape {
    pub fn source_objects(&self) -> Vec<ObjectId> {
        let mut seen: Vec<ObjectId> = Vec::new();
        for (_, deps) in &self.columns {
            for r in &deps.refs {
                if !seen.contains(&r.object) {
                    seen.push(r.object.clone());
                }
            }
        }
        for object in &self.wildcard_objects {
            if !seen.contains(object) {
                seen.push(object.clone());
            }
        }
        seen
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Carries session context through one statement's analysis.
pub(crate) struct Resolver<'a> {
    pub catalog: &'a ObjectCatalog,
    pub config: &'a ExtractorConfig,
    pub default_database: Option<String>,
    pub default_schema: Option<String>,
}

impl Resolver<'_> {
    pub fn qualify(&self, name: &ObjectName) -> ObjectId {
        qualify_object(
            name,
            self.default_database.as_deref(),
            self.default_schema.as_deref(),
        )
    }

    /// Analyze a full query, including its WITH clause. `outer` holds CTEs
    /// already in scope; later CTEs see earlier ones.
    pub fn analyze_query(
        &self,
        query: &Query,
        outer: &HashMap<String, VirtualRel>,
    ) -> ExtractResult<QueryShape> {
        let mut ctes = outer.clone();
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                let shape = self.analyze_query(&cte.query, &ctes)?;
                let rel = self.virtual_from_shape(&cte.alias.columns, shape);
                ctes.insert(cte.alias.name.value.to_lowercase(), rel);
            }
        }
        self.analyze_set_expr(query.body.as_ref(), &ctes)
    }

    fn analyze_set_expr(
        &self,
        body: &SetExpr,
        ctes: &HashMap<String, VirtualRel>,
    ) -> ExtractResult<QueryShape> {
        match body {
            SetExpr::Select(select) => self.analyze_select(select, ctes),
            SetExpr::Query(query) => self.analyze_query(query, ctes),
            SetExpr::SetOperation { left, right, .. } => {
                let left = self.analyze_set_expr(left, ctes)?;
                let right = self.analyze_set_expr(right, ctes)?;
                Ok(merge_set_shapes(left, right))
            }
            // VALUES and other bodies carry no column references
            _ => Ok(QueryShape::default()),
        }
    }

    fn analyze_select(
        &self,
        select: &Select,
        ctes: &HashMap<String, VirtualRel>,
    ) -> ExtractResult<QueryShape> {
        let mut relations: Vec<RelEntry> = Vec::new();
        let mut predicates: Vec<ResolvedRef> = Vec::new();
        for twj in &select.from {
            self.collect_relations(twj, ctes, &mut relations, &mut predicates)?;
        }
        // Rows coming out of a virtual relation were already gated by its
        // inner predicates; surface them for the enclosing statement.
        for entry in &relations {
            if let Relation::Virtual(rel) = &entry.relation {
                predicates.extend(rel.predicates.iter().cloned());
            }
        }

        let mut columns: Vec<(Option<String>, ColumnDeps)> = Vec::new();
        let mut wildcard_objects: Vec<ObjectId> = Vec::new();
        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) => {
                    let name = bare_column_name(expr);
                    columns.push((name, self.classify_expr(expr, &relations, ctes)));
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    let name = Some(alias.value.to_lowercase());
                    columns.push((name, self.classify_expr(expr, &relations, ctes)));
                }
                SelectItem::Wildcard(_) => {
                    for entry in &relations {
                        self.expand_wildcard(entry, &mut columns, &mut wildcard_objects);
                    }
                }
                SelectItem::QualifiedWildcard(name, _) => {
                    let key = name.0.last().map(|ident| ident.value.to_lowercase());
                    match relations.iter().find(|e| e.key == key) {
                        Some(entry) => {
                            self.expand_wildcard(entry, &mut columns, &mut wildcard_objects);
                        }
                        None => wildcard_objects.push(self.qualify(name)),
                    }
                }
            }
        }

        if let Some(selection) = &select.selection {
            self.collect_predicate(
                selection,
                &relations,
                TransformationKind::Filter,
                &mut predicates,
            );
        }
        if let Some(having) = &select.having {
            self.collect_predicate(
                having,
                &relations,
                TransformationKind::Filter,
                &mut predicates,
            );
        }

        Ok(QueryShape {
            columns,
            predicates,
            wildcard_objects,
        })
    }

    /// Flatten one FROM entry (relation plus joins) into `out`, collecting
    /// join constraints as predicate refs along the way.
    pub fn collect_relations(
        &self,
        twj: &TableWithJoins,
        ctes: &HashMap<String, VirtualRel>,
        out: &mut Vec<RelEntry>,
        predicates: &mut Vec<ResolvedRef>,
    ) -> ExtractResult<()> {
        self.push_relation(&twj.relation, ctes, out, predicates)?;
        for join in &twj.joins {
            self.push_relation(&join.relation, ctes, out, predicates)?;
            match join_constraint(&join.join_operator) {
                Some(JoinConstraint::On(expr)) => {
                    self.collect_predicate(expr, out, TransformationKind::Join, predicates);
                }
                Some(JoinConstraint::Using(columns)) => {
                    for ident in columns {
                        let column = ident.value.to_lowercase();
                        for mut r in self.resolve_unqualified(out, &column) {
                            r.kind = TransformationKind::Join;
                            r.confidence =
                                (self.config.predicate * r.confidence).max(self.config.chain_floor);
                            predicates.push(r);
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn push_relation(
        &self,
        factor: &TableFactor,
        ctes: &HashMap<String, VirtualRel>,
        out: &mut Vec<RelEntry>,
        predicates: &mut Vec<ResolvedRef>,
    ) -> ExtractResult<()> {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let key = alias
                    .as_ref()
                    .map(|a| a.name.value.to_lowercase())
                    .or_else(|| name.0.last().map(|ident| ident.value.to_lowercase()));
                // A bare single-part name may reference a CTE.
                if name.0.len() == 1 {
                    let cte_key = name.0[0].value.to_lowercase();
                    if let Some(rel) = ctes.get(&cte_key) {
                        out.push(RelEntry {
                            key,
                            relation: Relation::Virtual(rel.clone()),
                        });
                        return Ok(());
                    }
                }
                out.push(RelEntry {
                    key,
                    relation: Relation::Base(self.qualify(name)),
                });
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                let shape = self.analyze_query(subquery, ctes)?;
                let alias_columns: &[TableAliasColumnDef] = alias
                    .as_ref()
                    .map(|a| a.columns.as_slice())
                    .unwrap_or(&[]);
                let rel = self.virtual_from_shape(alias_columns, shape);
                let key = alias.as_ref().map(|a| a.name.value.to_lowercase());
                out.push(RelEntry {
                    key,
                    relation: Relation::Virtual(rel),
                });
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => {
                self.collect_relations(table_with_joins, ctes, out, predicates)?;
            }
            // Table functions and the rest contribute no resolvable columns
            _ => {}
        }
        Ok(())
    }

    fn virtual_from_shape(
        &self,
        alias_columns: &[TableAliasColumnDef],
        shape: QueryShape,
    ) -> VirtualRel {
        let source_objects = shape.source_objects();
        let wildcard_objects = shape.wildcard_objects;
        let mut columns = shape.columns;
        for (i, def) in alias_columns.iter().enumerate() {
            if let Some(slot) = columns.get_mut(i) {
                slot.0 = Some(def.name.value.to_lowercase());
            }
        }
        VirtualRel {
            columns,
            predicates: shape.predicates,
            source_objects,
            wildcard_objects,
        }
    }

    fn expand_wildcard(
        &self,
        entry: &RelEntry,
        columns: &mut Vec<(Option<String>, ColumnDeps)>,
        wildcard_objects: &mut Vec<ObjectId>,
    ) {
        match &entry.relation {
            Relation::Base(object) => match self.catalog.columns(object) {
                Some(known) => {
                    for column in known {
                        let r = ResolvedRef {
                            object: object.clone(),
                            column: Some(column.clone()),
                            kind: TransformationKind::DirectCopy,
                            confidence: self.config.wildcard_copy,
                        };
                        columns.push((Some(column.clone()), ColumnDeps { refs: vec![r] }));
                    }
                }
                None => wildcard_objects.push(object.clone()),
            },
            Relation::Virtual(rel) => {
                for (name, deps) in &rel.columns {
                    columns.push((name.clone(), deps.clone()));
                }
                wildcard_objects.extend(rel.wildcard_objects.iter().cloned());
                if rel.columns.is_empty() && rel.wildcard_objects.is_empty() {
                    wildcard_objects.extend(rel.source_objects.iter().cloned());
                }
            }
        }
    }

    /// Derive the dependencies of one projected expression.
    pub fn classify_expr(
        &self,
        expr: &Expr,
        relations: &[RelEntry],
        ctes: &HashMap<String, VirtualRel>,
    ) -> ColumnDeps {
        // A bare column reference keeps the chain's kind and confidence.
        if let Some(parts) = bare_column_parts(expr) {
            let refs = self.resolve_parts(relations, &parts);
            return ColumnDeps {
                refs: self.scale_refs(refs, TransformationKind::DirectCopy, self.config.direct_copy),
            };
        }

        let mut leaves: Vec<Vec<String>> = Vec::new();
        let mut saw_aggregate = false;
        let mut subqueries: Vec<&Query> = Vec::new();
        collect_expr_leaves(expr, &mut leaves, &mut saw_aggregate, &mut subqueries);

        let (outer_kind, outer_conf) = if saw_aggregate {
            (TransformationKind::Aggregation, self.config.aggregation)
        } else {
            (TransformationKind::Calculation, self.config.calculation)
        };

        let mut refs: Vec<ResolvedRef> = Vec::new();
        for parts in &leaves {
            refs.extend(self.resolve_parts(relations, parts));
        }
        for subquery in subqueries {
            if let Ok(shape) = self.analyze_query(subquery, ctes) {
                for (_, deps) in shape.columns {
                    refs.extend(deps.refs);
                }
            }
        }
        ColumnDeps {
            refs: self.scale_refs(refs, outer_kind, outer_conf),
        }
    }

    /// Resolve every column referenced by a predicate expression, stamped
    /// with the given kind (Filter or Join) at predicate confidence.
    pub fn collect_predicate(
        &self,
        expr: &Expr,
        relations: &[RelEntry],
        kind: TransformationKind,
        out: &mut Vec<ResolvedRef>,
    ) {
        let mut leaves: Vec<Vec<String>> = Vec::new();
        let mut saw_aggregate = false;
        let mut subqueries: Vec<&Query> = Vec::new();
        collect_expr_leaves(expr, &mut leaves, &mut saw_aggregate, &mut subqueries);
        for parts in &leaves {
            for mut r in self.resolve_parts(relations, parts) {
                r.kind = kind;
                r.confidence = (self.config.predicate * r.confidence).max(self.config.chain_floor);
                out.push(r);
            }
        }
    }

    fn scale_refs(
        &self,
        refs: Vec<ResolvedRef>,
        outer: TransformationKind,
        outer_conf: f64,
    ) -> Vec<ResolvedRef> {
        refs.into_iter()
            .map(|mut r| {
                r.kind = compose_kind(r.kind, outer);
                r.confidence = (r.confidence * outer_conf).max(self.config.chain_floor);
                r
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Column reference resolution
    // ------------------------------------------------------------------------

    pub fn resolve_parts(&self, relations: &[RelEntry], parts: &[String]) -> Vec<ResolvedRef> {
        match parts.len() {
            0 => Vec::new(),
            1 => self.resolve_unqualified(relations, &parts[0]),
            2 => self.resolve_qualified(relations, &parts[0], &parts[1]),
            _ => {
                // Schema- or database-qualified: the object is spelled out.
                let object_parts = &parts[..parts.len() - 1];
                let object = if object_parts.len() == 2 {
                    ObjectId::from_parts(&[
                        self.default_database.as_deref().unwrap_or(""),
                        object_parts[0].as_str(),
                        object_parts[1].as_str(),
                    ])
                } else {
                    let borrowed: Vec<&str> = object_parts.iter().map(String::as_str).collect();
                    ObjectId::from_parts(&borrowed)
                };
                vec![ResolvedRef {
                    object,
                    column: parts.last().cloned(),
                    kind: TransformationKind::DirectCopy,
                    confidence: 1.0,
                }]
            }
        }
    }

    fn resolve_qualified(
        &self,
        relations: &[RelEntry],
        qualifier: &str,
        column: &str,
    ) -> Vec<ResolvedRef> {
        for entry in relations {
            if entry.key.as_deref() == Some(qualifier) {
                return self.refs_from_relation(&entry.relation, column);
            }
        }
        // Not a known alias: assume a table referenced outside the FROM
        // clause, qualified by the session context.
        let object = ObjectId::from_parts(&[
            self.default_database.as_deref().unwrap_or(""),
            self.default_schema.as_deref().unwrap_or(""),
            qualifier,
        ]);
        vec![ResolvedRef {
            object,
            column: Some(column.to_string()),
            kind: TransformationKind::DirectCopy,
            confidence: 1.0,
        }]
    }

    fn resolve_unqualified(&self, relations: &[RelEntry], column: &str) -> Vec<ResolvedRef> {
        if relations.is_empty() {
            return Vec::new();
        }
        if relations.len() == 1 {
            return self.refs_from_relation(&relations[0].relation, column);
        }
        // Prefer the relation whose known schema carries the column; fall
        // back to the first relation when ownership stays ambiguous.
        let mut owners: Vec<usize> = Vec::new();
        for (i, entry) in relations.iter().enumerate() {
            let has = match &entry.relation {
                Relation::Base(object) => self
                    .catalog
                    .columns(object)
                    .map(|cols| cols.iter().any(|c| c == column))
                    .unwrap_or(false),
                Relation::Virtual(rel) => rel
                    .columns
                    .iter()
                    .any(|(name, _)| name.as_deref() == Some(column)),
            };
            if has {
                owners.push(i);
            }
        }
        let chosen = if owners.len() == 1 { owners[0] } else { 0 };
        self.refs_from_relation(&relations[chosen].relation, column)
    }

    fn refs_from_relation(&self, relation: &Relation, column: &str) -> Vec<ResolvedRef> {
        match relation {
            Relation::Base(object) => vec![ResolvedRef {
                object: object.clone(),
                column: Some(column.to_string()),
                kind: TransformationKind::DirectCopy,
                confidence: 1.0,
            }],
            Relation::Virtual(rel) => {
                for (name, deps) in &rel.columns {
                    if name.as_deref() == Some(column) {
                        return deps.refs.clone();
                    }
                }
                // Column not visible through the relation's projection:
                // degrade to its base objects.
                rel.source_objects
                    .iter()
                    .map(|object| ResolvedRef {
                        object: object.clone(),
                        column: None,
                        kind: TransformationKind::Unknown,
                        confidence: self.config.wildcard_unknown,
                    })
                    .collect()
            }
        }
    }
}

// ============================================================================
// Free helpers
// ============================================================================

/// Qualify an object name with session defaults: one part gets database and
/// schema, two parts get the database, three or more pass through.
pub(crate) fn qualify_object(
    name: &ObjectName,
    default_database: Option<&str>,
    default_schema: Option<&str>,
) -> ObjectId {
    let parts: Vec<String> = name.0.iter().map(|ident| ident.value.to_lowercase()).collect();
    match parts.len() {
        0 => ObjectId::from_parts(&[]),
        1 => ObjectId::from_parts(&[
            default_database.unwrap_or(""),
            default_schema.unwrap_or(""),
            parts[0].as_str(),
        ]),
        2 => ObjectId::from_parts(&[
            default_database.unwrap_or(""),
            parts[0].as_str(),
            parts[1].as_str(),
        ]),
        _ => {
            let borrowed: Vec<&str> = parts.iter().map(String::as_str).collect();
            ObjectId::from_parts(&borrowed)
        }
    }
}

fn merge_set_shapes(mut left: QueryShape, right: QueryShape) -> QueryShape {
    let mut right_columns = right.columns.into_iter();
    for slot in left.columns.iter_mut() {
        if let Some((_, deps)) = right_columns.next() {
            slot.1.refs.extend(deps.refs);
        }
    }
    left.predicates.extend(right.predicates);
    left.wildcard_objects.extend(right.wildcard_objects);
    left
}

fn join_constraint(op: &JoinOperator) -> Option<&JoinConstraint> {
    match op {
        JoinOperator::Inner(c)
        | JoinOperator::LeftOuter(c)
        | JoinOperator::RightOuter(c)
        | JoinOperator::FullOuter(c)
        | JoinOperator::LeftSemi(c)
        | JoinOperator::RightSemi(c)
        | JoinOperator::LeftAnti(c)
        | JoinOperator::RightAnti(c) => Some(c),
        _ => None,
    }
}

/// Strongest transformation wins along a chain; unknown stays unknown.
fn compose_kind(chain: TransformationKind, outer: TransformationKind) -> TransformationKind {
    use TransformationKind::*;
    match (chain, outer) {
        (Unknown, _) | (_, Unknown) => Unknown,
        (Aggregation, _) | (_, Aggregation) => Aggregation,
        (Calculation, _) | (_, Calculation) => Calculation,
        _ => DirectCopy,
    }
}

pub(crate) fn bare_column_parts(expr: &Expr) -> Option<Vec<String>> {
    match expr {
        Expr::Identifier(ident) => Some(vec![ident.value.to_lowercase()]),
        Expr::CompoundIdentifier(parts) if !parts.is_empty() => {
            Some(parts.iter().map(|i| i.value.to_lowercase()).collect())
        }
        Expr::Nested(inner) => bare_column_parts(inner),
        _ => None,
    }
}

fn bare_column_name(expr: &Expr) -> Option<String> {
    bare_column_parts(expr).and_then(|parts| parts.last().cloned())
}

const AGGREGATE_FUNCTIONS: &[&str] = &[
    "ANY_VALUE",
    "APPROX_COUNT_DISTINCT",
    "ARRAY_AGG",
    "AVG",
    "BIT_AND",
    "BIT_OR",
    "BOOL_AND",
    "BOOL_OR",
    "CORR",
    "COUNT",
    "COUNT_IF",
    "COVAR_POP",
    "COVAR_SAMP",
    "LISTAGG",
    "MAX",
    "MEDIAN",
    "MIN",
    "MODE",
    "OBJECT_AGG",
    "PERCENTILE_CONT",
    "PERCENTILE_DISC",
    "STDDEV",
    "STDDEV_POP",
    "STDDEV_SAMP",
    "STRING_AGG",
    "SUM",
    "VARIANCE",
    "VAR_POP",
    "VAR_SAMP",
];

fn is_aggregate_call(func: &Function) -> bool {
    // A windowed aggregate yields one value per row, not a collapse.
    if func.over.is_some() {
        return false;
    }
    let name = func
        .name
        .0
        .last()
        .map(|ident| ident.value.to_uppercase())
        .unwrap_or_default();
    AGGREGATE_FUNCTIONS.contains(&name.as_str())
}

/// Walk an expression collecting column leaves, aggregate sightings, and
/// scalar subqueries. Predicate-only constructs (EXISTS, IN-subquery bodies)
/// are deliberately not descended into.
fn collect_expr_leaves<'a>(
    expr: &'a Expr,
    leaves: &mut Vec<Vec<String>>,
    saw_aggregate: &mut bool,
    subqueries: &mut Vec<&'a Query>,
) {
    match expr {
        Expr::Identifier(ident) => leaves.push(vec![ident.value.to_lowercase()]),
        Expr::CompoundIdentifier(parts) => {
            leaves.push(parts.iter().map(|i| i.value.to_lowercase()).collect());
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_expr_leaves(left, leaves, saw_aggregate, subqueries);
            collect_expr_leaves(right, leaves, saw_aggregate, subqueries);
        }
        Expr::UnaryOp { expr, .. } => collect_expr_leaves(expr, leaves, saw_aggregate, subqueries),
        Expr::Nested(inner) => collect_expr_leaves(inner, leaves, saw_aggregate, subqueries),
        Expr::Cast { expr, .. } => collect_expr_leaves(expr, leaves, saw_aggregate, subqueries),
        Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            if let Some(operand) = operand {
                collect_expr_leaves(operand, leaves, saw_aggregate, subqueries);
            }
            for condition in conditions {
                collect_expr_leaves(condition, leaves, saw_aggregate, subqueries);
            }
            for result in results {
                collect_expr_leaves(result, leaves, saw_aggregate, subqueries);
            }
            if let Some(else_result) = else_result {
                collect_expr_leaves(else_result, leaves, saw_aggregate, subqueries);
            }
        }
        Expr::Function(func) => {
            if is_aggregate_call(func) {
                *saw_aggregate = true;
            }
            match &func.args {
                FunctionArguments::List(list) => {
                    for arg in &list.args {
                        let arg_expr = match arg {
                            FunctionArg::Unnamed(e) => e,
                            FunctionArg::Named { arg, .. } => arg,
                            FunctionArg::ExprNamed { arg, .. } => arg,
                        };
                        if let FunctionArgExpr::Expr(e) = arg_expr {
                            collect_expr_leaves(e, leaves, saw_aggregate, subqueries);
                        }
                    }
                }
                FunctionArguments::Subquery(query) => subqueries.push(query),
                FunctionArguments::None => {}
            }
        }
        Expr::IsNull(e)
        | Expr::IsNotNull(e)
        | Expr::IsTrue(e)
        | Expr::IsNotTrue(e)
        | Expr::IsFalse(e)
        | Expr::IsNotFalse(e)
        | Expr::IsUnknown(e)
        | Expr::IsNotUnknown(e) => collect_expr_leaves(e, leaves, saw_aggregate, subqueries),
        Expr::Between {
            expr, low, high, ..
        } => {
            collect_expr_leaves(expr, leaves, saw_aggregate, subqueries);
            collect_expr_leaves(low, leaves, saw_aggregate, subqueries);
            collect_expr_leaves(high, leaves, saw_aggregate, subqueries);
        }
        Expr::InList { expr, list, .. } => {
            collect_expr_leaves(expr, leaves, saw_aggregate, subqueries);
            for e in list {
                collect_expr_leaves(e, leaves, saw_aggregate, subqueries);
            }
        }
        Expr::InSubquery { expr, .. } => {
            collect_expr_leaves(expr, leaves, saw_aggregate, subqueries);
        }
        Expr::Like { expr, pattern, .. }
        | Expr::ILike { expr, pattern, .. }
        | Expr::SimilarTo { expr, pattern, .. } => {
            collect_expr_leaves(expr, leaves, saw_aggregate, subqueries);
            collect_expr_leaves(pattern, leaves, saw_aggregate, subqueries);
        }
        Expr::Tuple(items) => {
            for e in items {
                collect_expr_leaves(e, leaves, saw_aggregate, subqueries);
            }
        }
        Expr::Subquery(query) => subqueries.push(query),
        Expr::Extract { expr, .. } => collect_expr_leaves(expr, leaves, saw_aggregate, subqueries),
        Expr::Substring {
            expr,
            substring_from,
            substring_for,
            ..
        } => {
            collect_expr_leaves(expr, leaves, saw_aggregate, subqueries);
            if let Some(from) = substring_from {
                collect_expr_leaves(from, leaves, saw_aggregate, subqueries);
            }
            if let Some(length) = substring_for {
                collect_expr_leaves(length, leaves, saw_aggregate, subqueries);
            }
        }
        Expr::Trim {
            expr,
            trim_what,
            trim_characters,
            ..
        } => {
            collect_expr_leaves(expr, leaves, saw_aggregate, subqueries);
            if let Some(what) = trim_what {
                collect_expr_leaves(what, leaves, saw_aggregate, subqueries);
            }
            if let Some(characters) = trim_characters {
                for e in characters {
                    collect_expr_leaves(e, leaves, saw_aggregate, subqueries);
                }
            }
        }
        Expr::Position { expr, r#in } => {
            collect_expr_leaves(expr, leaves, saw_aggregate, subqueries);
            collect_expr_leaves(r#in, leaves, saw_aggregate, subqueries);
        }
        Expr::Floor { expr, .. } | Expr::Ceil { expr, .. } => {
            collect_expr_leaves(expr, leaves, saw_aggregate, subqueries);
        }
        Expr::Collate { expr, .. } => collect_expr_leaves(expr, leaves, saw_aggregate, subqueries),
        Expr::IsDistinctFrom(a, b) | Expr::IsNotDistinctFrom(a, b) => {
            collect_expr_leaves(a, leaves, saw_aggregate, subqueries);
            collect_expr_leaves(b, leaves, saw_aggregate, subqueries);
        }
        Expr::AnyOp { left, right, .. } | Expr::AllOp { left, right, .. } => {
            collect_expr_leaves(left, leaves, saw_aggregate, subqueries);
            collect_expr_leaves(right, leaves, saw_aggregate, subqueries);
        }
        _ => {}
    }
}

// ============================================================================
// Tests
// ============================================================================
