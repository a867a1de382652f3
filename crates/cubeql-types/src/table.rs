//! The function table
//!
//! Overloads are keyed by upper-cased name and [`Syntax`]. The builtin table
//! is built once; an engine clones it and appends its user functions.

use crate::signature::{Builtin, DependencyRule, FunctionSignature, TypeRule};
use crate::types::Category;
use cubeql_ast::Syntax;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::sync::Arc;

pub const DESCENDANTS_FLAGS: &[&str] = &[
    "SELF",
    "AFTER",
    "BEFORE",
    "BEFORE_AND_AFTER",
    "SELF_AND_AFTER",
    "SELF_AND_BEFORE",
    "SELF_BEFORE_AFTER",
    "LEAVES",
];
pub const ORDER_FLAGS: &[&str] = &["ASC", "DESC", "BASC", "BDESC"];
pub const ALL_FLAG: &[&str] = &["ALL"];
pub const POST_FLAG: &[&str] = &["POST"];
pub const COUNT_FLAGS: &[&str] = &["INCLUDEEMPTY", "EXCLUDEEMPTY"];
pub const RECURSIVE_FLAG: &[&str] = &["RECURSIVE"];

static STANDARD: Lazy<FunctionTable> = Lazy::new(FunctionTable::build_standard);

/// All known overloads
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    overloads: IndexMap<(String, Syntax), Vec<Arc<FunctionSignature>>>,
    user_count: u32,
}

impl FunctionTable {
    /// The builtin table
    pub fn standard() -> &'static FunctionTable {
        &STANDARD
    }

    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, signature: FunctionSignature) {
        let key = (signature.name.to_uppercase(), signature.syntax);
        self.overloads
            .entry(key)
            .or_default()
            .push(Arc::new(signature));
    }

    /// Register a user function overload, returning its builtin id
    pub fn register_user(
        &mut self,
        name: &str,
        params: &[Category],
        returns: TypeRule,
    ) -> Builtin {
        let builtin = Builtin::User(self.user_count);
        self.user_count += 1;
        self.register(
            FunctionSignature::new(name, Syntax::Function, builtin, params, returns)
                .depends(DependencyRule::Opaque),
        );
        builtin
    }

    /// Overloads for a name and syntax (case-insensitive)
    pub fn lookup(&self, name: &str, syntax: Syntax) -> &[Arc<FunctionSignature>] {
        self.overloads
            .get(&(name.to_uppercase(), syntax))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First overload implemented by `builtin`
    pub fn find(&self, builtin: Builtin) -> Option<&Arc<FunctionSignature>> {
        self.overloads
            .values()
            .flatten()
            .find(|s| s.builtin == builtin)
    }

    pub fn len(&self) -> usize {
        self.overloads.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.overloads.is_empty()
    }

    pub fn signatures(&self) -> impl Iterator<Item = &Arc<FunctionSignature>> {
        self.overloads.values().flatten()
    }

    fn build_standard() -> Self {
        let mut table = Self::new();
        add_navigation(&mut table);
        add_time(&mut table);
        add_metadata(&mut table);
        add_sets(&mut table);
        add_aggregates(&mut table);
        add_scalars(&mut table);
        add_strings(&mut table);
        log::debug!("Built standard function table with {} overloads", table.len());
        table
    }
}

use Category::{
    Dimension as D, Hierarchy as H, Level as L, Logical as B, Member as M, Numeric as N,
    Set as S, String as Str, Tuple as T, Value as V,
};
use DependencyRule as Dep;
use Syntax::{Function as Fun, Infix, Method, Postfix, Prefix, Property as Prop};

fn sig(
    name: &str,
    syntax: Syntax,
    builtin: Builtin,
    params: &[Category],
    returns: TypeRule,
) -> FunctionSignature {
    FunctionSignature::new(name, syntax, builtin, params, returns)
}

fn add_navigation(t: &mut FunctionTable) {
    use Builtin as F;
    use TypeRule as R;

    t.register(sig("Parent", Prop, F::Parent, &[M], R::MemberOf(0)));
    t.register(sig("Children", Prop, F::Children, &[M], R::MembersOf(0)));
    t.register(sig("FirstChild", Prop, F::FirstChild, &[M], R::MemberOf(0)));
    t.register(sig("LastChild", Prop, F::LastChild, &[M], R::MemberOf(0)));
    t.register(sig("FirstSibling", Prop, F::FirstSibling, &[M], R::SameLevelAs(0)));
    t.register(sig("LastSibling", Prop, F::LastSibling, &[M], R::SameLevelAs(0)));
    t.register(sig("Siblings", Prop, F::Siblings, &[M], R::MembersOf(0)));
    t.register(sig("PrevMember", Prop, F::PrevMember, &[M], R::SameLevelAs(0)));
    t.register(sig("NextMember", Prop, F::NextMember, &[M], R::SameLevelAs(0)));
    t.register(sig("Lag", Method, F::Lag, &[M, N], R::SameLevelAs(0)));
    t.register(sig("Lead", Method, F::Lead, &[M, N], R::SameLevelAs(0)));

    t.register(sig("Ancestor", Fun, F::Ancestor, &[M, L], R::MemberAtLevel(1)));
    t.register(sig("Ancestor", Fun, F::Ancestor, &[M, N], R::MemberOf(0)));
    t.register(sig("Ancestors", Fun, F::Ancestors, &[M, L], R::MembersAtLevel(1)));
    t.register(sig("Ancestors", Fun, F::Ancestors, &[M, N], R::MembersOf(0)));
    t.register(sig("Ascendants", Fun, F::Ascendants, &[M], R::MembersOf(0)));

    let flags = Category::Symbol(DESCENDANTS_FLAGS);
    for params in [
        &[M][..],
        &[M, L],
        &[M, L, flags],
        &[M, N],
        &[M, N, flags],
    ] {
        t.register(sig("Descendants", Fun, F::Descendants, params, R::MembersOf(0)));
    }
    for params in [
        &[S][..],
        &[S, L],
        &[S, L, flags],
        &[S, N],
        &[S, N, flags],
    ] {
        t.register(sig("Descendants", Fun, F::Descendants, params, R::SameAs(0)));
    }

    t.register(sig("Cousin", Fun, F::Cousin, &[M, M], R::MemberOf(1)));
    t.register(sig(":", Infix, F::Range, &[M, M], R::MembersOf(0)));

    t.register(
        sig("CurrentMember", Prop, F::CurrentMember, &[H], R::MemberOf(0))
            .depends(Dep::CurrentMember { arg: 0 }),
    );
    t.register(sig("DefaultMember", Prop, F::DefaultMember, &[H], R::MemberOf(0)));
    t.register(sig("Members", Prop, F::Members, &[L], R::MembersAtLevel(0)));
    t.register(sig("Members", Prop, F::Members, &[H], R::MembersOf(0)));
    t.register(sig("AllMembers", Prop, F::AllMembers, &[L], R::MembersAtLevel(0)));
    t.register(sig("AllMembers", Prop, F::AllMembers, &[H], R::MembersOf(0)));

    t.register(sig("Item", Method, F::Item, &[S, N], R::ElementOf(0)));
    t.register(sig("Item", Method, F::Item, &[T, N], R::AnyMember));
    t.register(sig("Current", Prop, F::Current, &[S], R::ElementOf(0)).depends(Dep::Cursor));
    t.register(
        sig("CurrentOrdinal", Prop, F::CurrentOrdinal, &[S], R::Numeric).depends(Dep::Cursor),
    );

    t.register(sig("IsLeaf", Fun, F::IsLeaf, &[M], R::Logical));
    t.register(sig("IsAncestor", Fun, F::IsAncestor, &[M, M], R::Logical));
    t.register(sig("IsSibling", Fun, F::IsSibling, &[M, M], R::Logical));
    for params in [&[M, M][..], &[T, T], &[L, L], &[H, H], &[D, D]] {
        t.register(sig("IS", Infix, F::Is, params, R::Logical));
    }
    t.register(sig("IS NULL", Postfix, F::IsNull, &[M], R::Logical));
    t.register(sig("IS NULL", Postfix, F::IsNull, &[T], R::Logical));
}

fn add_time(t: &mut FunctionTable) {
    use Builtin as F;
    use TypeRule as R;

    let implicit = Dep::ImplicitCurrent;
    t.register(sig("ParallelPeriod", Fun, F::ParallelPeriod, &[], R::TimeMember).depends(implicit));
    t.register(sig("ParallelPeriod", Fun, F::ParallelPeriod, &[L], R::TimeMember).depends(implicit));
    t.register(
        sig("ParallelPeriod", Fun, F::ParallelPeriod, &[L, N], R::TimeMember).depends(implicit),
    );
    t.register(sig("ParallelPeriod", Fun, F::ParallelPeriod, &[L, N, M], R::SameLevelAs(2)));

    for (name, builtin) in [
        ("OpeningPeriod", F::OpeningPeriod),
        ("ClosingPeriod", F::ClosingPeriod),
    ] {
        t.register(sig(name, Fun, builtin, &[], R::TimeMember).depends(implicit));
        t.register(sig(name, Fun, builtin, &[L], R::MemberAtLevel(0)).depends(implicit));
        t.register(sig(name, Fun, builtin, &[L, M], R::MemberAtLevel(0)));
    }

    t.register(sig("PeriodsToDate", Fun, F::PeriodsToDate, &[], R::TimeMembers).depends(implicit));
    t.register(sig("PeriodsToDate", Fun, F::PeriodsToDate, &[L], R::TimeMembers).depends(implicit));
    t.register(sig("PeriodsToDate", Fun, F::PeriodsToDate, &[L, M], R::MembersOf(1)));

    for (name, builtin) in [
        ("Ytd", F::Ytd),
        ("Qtd", F::Qtd),
        ("Mtd", F::Mtd),
        ("Wtd", F::Wtd),
    ] {
        t.register(sig(name, Fun, builtin, &[], R::TimeMembers).depends(implicit));
        t.register(sig(name, Fun, builtin, &[M], R::MembersOf(0)));
    }

    t.register(sig("LastPeriods", Fun, F::LastPeriods, &[N], R::TimeMembers).depends(implicit));
    t.register(sig("LastPeriods", Fun, F::LastPeriods, &[N, M], R::MembersOf(1)));
}

fn add_metadata(t: &mut FunctionTable) {
    use Builtin as F;
    use TypeRule as R;

    t.register(sig("Level", Prop, F::Level, &[M], R::LevelOf(0)));
    t.register(sig("Levels", Method, F::Levels, &[H, N], R::LevelOf(0)));
    t.register(sig("Levels", Method, F::Levels, &[H, Str], R::LevelOf(0)));
    t.register(sig("Hierarchy", Prop, F::Hierarchy, &[M], R::HierarchyOf(0)));
    t.register(sig("Hierarchy", Prop, F::Hierarchy, &[L], R::HierarchyOf(0)));
    for params in [&[M][..], &[L], &[H]] {
        t.register(sig("Dimension", Prop, F::Dimension, params, R::DimensionOf(0)));
    }
    for (name, builtin) in [
        ("Name", F::Name),
        ("UniqueName", F::UniqueName),
        ("Caption", F::Caption),
    ] {
        for params in [&[M][..], &[L], &[H], &[D]] {
            t.register(sig(name, Prop, builtin, params, R::String));
        }
    }
    t.register(sig("Ordinal", Prop, F::Ordinal, &[M], R::Numeric));
    t.register(sig("Ordinal", Prop, F::Ordinal, &[L], R::Numeric));
    t.register(sig("Properties", Method, F::Properties, &[M, Str], R::Scalar));
}

fn add_sets(t: &mut FunctionTable) {
    use Builtin as F;
    use TypeRule as R;

    t.register(sig("{}", Syntax::Braces, F::SetConstructor, &[], R::SameAs(0)));
    t.register(sig("()", Syntax::Parentheses, F::TupleConstructor, &[], R::Crossjoin));

    t.register(sig("Crossjoin", Fun, F::Crossjoin, &[S, S], R::Crossjoin).variadic(&[S]));
    t.register(sig("*", Infix, F::Crossjoin, &[S, S], R::Crossjoin));

    let all = Category::Symbol(ALL_FLAG);
    for (name, op, builtin) in [
        ("Union", "+", F::Union),
        ("Except", "-", F::Except),
        ("Intersect", "", F::Intersect),
    ] {
        t.register(sig(name, Fun, builtin, &[S, S], R::SameAs(0)));
        t.register(sig(name, Fun, builtin, &[S, S, all], R::SameAs(0)));
        if !op.is_empty() {
            t.register(sig(op, Infix, builtin, &[S, S], R::SameAs(0)));
        }
    }

    t.register(sig("Distinct", Fun, F::Distinct, &[S], R::SameAs(0)));
    t.register(sig("Extract", Fun, F::Extract, &[S, H], R::Extract).variadic(&[H]));
    t.register(sig("Head", Fun, F::Head, &[S], R::SameAs(0)));
    t.register(sig("Head", Fun, F::Head, &[S, N], R::SameAs(0)));
    t.register(sig("Tail", Fun, F::Tail, &[S], R::SameAs(0)));
    t.register(sig("Tail", Fun, F::Tail, &[S, N], R::SameAs(0)));
    t.register(sig("Subset", Fun, F::Subset, &[S, N], R::SameAs(0)));
    t.register(sig("Subset", Fun, F::Subset, &[S, N, N], R::SameAs(0)));

    t.register(
        sig("Filter", Fun, F::Filter, &[S, B], R::SameAs(0))
            .depends(Dep::Iterating { set: 0, body: &[1] }),
    );
    t.register(
        sig("Generate", Fun, F::Generate, &[S, S], R::SameAs(1))
            .depends(Dep::Iterating { set: 0, body: &[1] }),
    );
    t.register(
        sig("Generate", Fun, F::Generate, &[S, S, all], R::SameAs(1))
            .depends(Dep::Iterating { set: 0, body: &[1] }),
    );
    t.register(
        sig("Generate", Fun, F::GenerateString, &[S, Str], R::String)
            .depends(Dep::Iterating { set: 0, body: &[1] }),
    );
    t.register(
        sig("Generate", Fun, F::GenerateString, &[S, Str, Str], R::String)
            .depends(Dep::Iterating { set: 0, body: &[1] }),
    );

    let order = Category::Symbol(ORDER_FLAGS);
    t.register(sig("Order", Fun, F::Order, &[S, V], R::SameAs(0)).depends(Dep::IteratingRest { set: 0 }));
    t.register(
        sig("Order", Fun, F::Order, &[S, V, order], R::SameAs(0))
            .variadic(&[V, order])
            .depends(Dep::IteratingRest { set: 0 }),
    );

    t.register(sig("Hierarchize", Fun, F::Hierarchize, &[S], R::SameAs(0)));
    t.register(
        sig("Hierarchize", Fun, F::Hierarchize, &[S, Category::Symbol(POST_FLAG)], R::SameAs(0)),
    );
    t.register(sig("Unorder", Fun, F::Unorder, &[S], R::SameAs(0)));

    t.register(sig("Rank", Fun, F::Rank, &[T, S], R::Numeric));
    t.register(
        sig("Rank", Fun, F::Rank, &[T, S, V], R::Numeric)
            .depends(Dep::Iterating { set: 1, body: &[2] }),
    );

    for (name, builtin) in [("TopCount", F::TopCount), ("BottomCount", F::BottomCount)] {
        t.register(sig(name, Fun, builtin, &[S, N], R::SameAs(0)));
        t.register(
            sig(name, Fun, builtin, &[S, N, N], R::SameAs(0))
                .depends(Dep::Iterating { set: 0, body: &[2] }),
        );
    }
    for (name, builtin) in [
        ("TopPercent", F::TopPercent),
        ("BottomPercent", F::BottomPercent),
        ("TopSum", F::TopSum),
        ("BottomSum", F::BottomSum),
    ] {
        t.register(
            sig(name, Fun, builtin, &[S, N, N], R::SameAs(0))
                .depends(Dep::Iterating { set: 0, body: &[2] }),
        );
    }

    t.register(sig("Count", Fun, F::Count, &[S], R::Numeric));
    t.register(
        sig("Count", Fun, F::Count, &[S, Category::Symbol(COUNT_FLAGS)], R::Numeric)
            .depends(Dep::IteratingCell { set: 0 }),
    );
    t.register(sig("Count", Prop, F::Count, &[S], R::Numeric));

    t.register(sig("VisualTotals", Fun, F::VisualTotals, &[S], R::SameAs(0)));
    t.register(sig("VisualTotals", Fun, F::VisualTotals, &[S, Str], R::SameAs(0)));
    t.register(sig("Exists", Fun, F::Exists, &[S, S], R::SameAs(0)));
    t.register(sig("Exists", Fun, F::Exists, &[S, S, Str], R::SameAs(0)));
    t.register(sig("Existing", Prefix, F::Existing, &[S], R::SameAs(0)));
    t.register(
        sig("NonEmpty", Fun, F::NonEmpty, &[S], R::SameAs(0)).depends(Dep::IteratingCell { set: 0 }),
    );
    t.register(
        sig("NonEmpty", Fun, F::NonEmpty, &[S, S], R::SameAs(0))
            .depends(Dep::IteratingCell { set: 0 }),
    );

    t.register(sig("DrilldownLevel", Fun, F::DrilldownLevel, &[S], R::SameAs(0)));
    t.register(sig("DrilldownLevel", Fun, F::DrilldownLevel, &[S, L], R::SameAs(0)));
    t.register(sig("DrilldownMember", Fun, F::DrilldownMember, &[S, S], R::SameAs(0)));
    t.register(
        sig(
            "DrilldownMember",
            Fun,
            F::DrilldownMember,
            &[S, S, Category::Symbol(RECURSIVE_FLAG)],
            R::SameAs(0),
        ),
    );
    t.register(sig("DrillupLevel", Fun, F::DrillupLevel, &[S], R::SameAs(0)));
    t.register(sig("DrillupLevel", Fun, F::DrillupLevel, &[S, L], R::SameAs(0)));
    t.register(sig("DrillupMember", Fun, F::DrillupMember, &[S, S], R::SameAs(0)));
    t.register(sig("AddCalculatedMembers", Fun, F::AddCalculatedMembers, &[S], R::SameAs(0)));
    t.register(sig("StripCalculatedMembers", Fun, F::StripCalculatedMembers, &[S], R::SameAs(0)));
}

fn add_aggregates(t: &mut FunctionTable) {
    use Builtin as F;
    use TypeRule as R;

    for (name, builtin) in [
        ("Sum", F::Sum),
        ("Avg", F::Avg),
        ("Min", F::Min),
        ("Max", F::Max),
        ("Aggregate", F::Aggregate),
        ("Median", F::Median),
        ("Var", F::Var),
        ("Variance", F::Var),
        ("VarP", F::VarP),
        ("VarianceP", F::VarP),
        ("Stdev", F::Stdev),
        ("StdDev", F::Stdev),
        ("StdevP", F::StdevP),
        ("StdDevP", F::StdevP),
    ] {
        t.register(sig(name, Fun, builtin, &[S], R::Numeric).depends(Dep::IteratingCell { set: 0 }));
        t.register(
            sig(name, Fun, builtin, &[S, N], R::Numeric)
                .depends(Dep::Iterating { set: 0, body: &[1] }),
        );
    }
    for (name, builtin) in [
        ("Covariance", F::Covariance),
        ("CovarianceN", F::CovarianceN),
        ("Correlation", F::Correlation),
    ] {
        t.register(
            sig(name, Fun, builtin, &[S, N], R::Numeric)
                .depends(Dep::IteratingCell { set: 0 }),
        );
        t.register(
            sig(name, Fun, builtin, &[S, N, N], R::Numeric)
                .depends(Dep::Iterating { set: 0, body: &[1, 2] }),
        );
    }
    t.register(
        sig("DistinctCount", Fun, F::DistinctCount, &[S], R::Numeric)
            .depends(Dep::IteratingCell { set: 0 }),
    );
}

fn add_scalars(t: &mut FunctionTable) {
    use Builtin as F;
    use TypeRule as R;

    t.register(sig("+", Infix, F::Add, &[N, N], R::Numeric));
    t.register(sig("-", Infix, F::Subtract, &[N, N], R::Numeric));
    t.register(sig("*", Infix, F::Multiply, &[N, N], R::Numeric));
    t.register(sig("/", Infix, F::Divide, &[N, N], R::Numeric));
    t.register(sig("-", Prefix, F::Negate, &[N], R::Numeric));

    for (op, builtin) in [
        ("=", F::Equal),
        ("<>", F::NotEqual),
        ("<", F::Less),
        ("<=", F::LessOrEqual),
        (">", F::Greater),
        (">=", F::GreaterOrEqual),
    ] {
        t.register(sig(op, Infix, builtin, &[N, N], R::Logical));
        t.register(sig(op, Infix, builtin, &[Str, Str], R::Logical));
        t.register(sig(op, Infix, builtin, &[V, V], R::Logical));
    }

    t.register(sig("AND", Infix, F::And, &[B, B], R::Logical));
    t.register(sig("OR", Infix, F::Or, &[B, B], R::Logical));
    t.register(sig("XOR", Infix, F::Xor, &[B, B], R::Logical));
    t.register(sig("NOT", Prefix, F::Not, &[B], R::Logical));

    t.register(sig("IIf", Fun, F::IIf, &[B, N, N], R::Numeric));
    t.register(sig("IIf", Fun, F::IIf, &[B, Str, Str], R::String));
    t.register(sig("IIf", Fun, F::IIf, &[B, B, B], R::Logical));
    t.register(sig("IIf", Fun, F::IIf, &[B, V, V], R::Scalar));
    t.register(sig("IIf", Fun, F::IIf, &[B, M, M], R::MemberOf(1)));
    t.register(sig("IIf", Fun, F::IIf, &[B, T, T], R::SameAs(1)));
    t.register(sig("IIf", Fun, F::IIf, &[B, S, S], R::SameAs(1)));

    t.register(sig(cubeql_ast::CASE_TEST, Syntax::Case, F::CaseTest, &[], R::Scalar));
    t.register(sig(cubeql_ast::CASE_MATCH, Syntax::Case, F::CaseMatch, &[], R::Scalar));

    t.register(sig("CoalesceEmpty", Fun, F::CoalesceEmpty, &[N, N], R::Numeric).variadic(&[N]));
    t.register(sig("CoalesceEmpty", Fun, F::CoalesceEmpty, &[Str, Str], R::String).variadic(&[Str]));
    t.register(sig("CoalesceEmpty", Fun, F::CoalesceEmpty, &[V, V], R::Scalar).variadic(&[V]));
    t.register(sig("IsEmpty", Fun, F::IsEmpty, &[V], R::Logical));
    t.register(
        sig("Value", Prop, F::Value, &[T], R::Scalar).depends(Dep::IteratingCell { set: 0 }),
    );

    t.register(sig("Abs", Fun, F::Abs, &[N], R::Numeric));
    t.register(sig("Int", Fun, F::Int, &[N], R::Numeric));
    t.register(sig("Sqrt", Fun, F::Sqrt, &[N], R::Numeric));
    t.register(sig("Round", Fun, F::Round, &[N], R::Numeric));
    t.register(sig("Round", Fun, F::Round, &[N, N], R::Numeric));
}

fn add_strings(t: &mut FunctionTable) {
    use Builtin as F;
    use TypeRule as R;

    t.register(sig("||", Infix, F::Concat, &[Str, Str], R::String));
    t.register(sig("Len", Fun, F::Len, &[Str], R::Numeric));
    t.register(sig("UCase", Fun, F::UCase, &[Str], R::String));
    t.register(sig("LCase", Fun, F::LCase, &[Str], R::String));
    t.register(sig("Trim", Fun, F::Trim, &[Str], R::String));
    t.register(sig("Left", Fun, F::Left, &[Str, N], R::String));
    t.register(sig("Right", Fun, F::Right, &[Str, N], R::String));
    t.register(sig("Mid", Fun, F::Mid, &[Str, N], R::String));
    t.register(sig("Mid", Fun, F::Mid, &[Str, N, N], R::String));
    t.register(sig("InStr", Fun, F::InStr, &[Str, Str], R::Numeric));
    t.register(sig("InStr", Fun, F::InStr, &[N, Str, Str], R::Numeric));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = FunctionTable::standard();
        assert_eq!(table.lookup("descendants", Syntax::Function).len(), 10);
        assert_eq!(table.lookup("LAG", Syntax::Method).len(), 1);
        assert!(table.lookup("Lag", Syntax::Function).is_empty());
    }

    #[test]
    fn test_every_builtin_family_is_registered() {
        let table = FunctionTable::standard();
        for builtin in [
            Builtin::Cousin,
            Builtin::VisualTotals,
            Builtin::Correlation,
            Builtin::InStr,
            Builtin::CaseMatch,
            Builtin::Existing,
        ] {
            assert!(table.find(builtin).is_some(), "{builtin:?} missing");
        }
    }

    #[test]
    fn test_user_functions_get_fresh_ids() {
        let mut table = FunctionTable::standard().clone();
        let first = table.register_user("Double", &[N], TypeRule::Numeric);
        let second = table.register_user("Shout", &[Str], TypeRule::String);
        assert_eq!(first, Builtin::User(0));
        assert_eq!(second, Builtin::User(1));
        assert_eq!(table.lookup("double", Syntax::Function).len(), 1);
        assert!(FunctionTable::standard().lookup("Double", Syntax::Function).is_empty());
    }
}
