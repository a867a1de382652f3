//! Member navigation over a [`SchemaReader`]
//!
//! Running off the structure (past the root, past the last sibling, below
//! a leaf) yields the null member or an empty list. Only misuse, such as
//! navigating to a level of another hierarchy, is an error.

use crate::error::{EvalError, EvalResult};
use cubeql_model::{HierarchyId, LevelId, LevelKind, Member, SchemaReader};

/// Which members `Descendants` returns relative to the target depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescendantsFlag {
    SelfOnly,
    After,
    Before,
    BeforeAndAfter,
    SelfAndAfter,
    SelfAndBefore,
    SelfBeforeAfter,
    Leaves,
}

impl DescendantsFlag {
    pub fn parse(keyword: &str) -> Option<Self> {
        Some(match keyword.to_uppercase().as_str() {
            "SELF" => DescendantsFlag::SelfOnly,
            "AFTER" => DescendantsFlag::After,
            "BEFORE" => DescendantsFlag::Before,
            "BEFORE_AND_AFTER" => DescendantsFlag::BeforeAndAfter,
            "SELF_AND_AFTER" => DescendantsFlag::SelfAndAfter,
            "SELF_AND_BEFORE" => DescendantsFlag::SelfAndBefore,
            "SELF_BEFORE_AFTER" => DescendantsFlag::SelfBeforeAfter,
            "LEAVES" => DescendantsFlag::Leaves,
            _ => return None,
        })
    }

    fn includes_before(self) -> bool {
        matches!(
            self,
            DescendantsFlag::Before
                | DescendantsFlag::BeforeAndAfter
                | DescendantsFlag::SelfAndBefore
                | DescendantsFlag::SelfBeforeAfter
        )
    }

    fn includes_self(self) -> bool {
        matches!(
            self,
            DescendantsFlag::SelfOnly
                | DescendantsFlag::SelfAndAfter
                | DescendantsFlag::SelfAndBefore
                | DescendantsFlag::SelfBeforeAfter
                | DescendantsFlag::Leaves
        )
    }

    fn includes_after(self) -> bool {
        matches!(
            self,
            DescendantsFlag::After
                | DescendantsFlag::BeforeAndAfter
                | DescendantsFlag::SelfAndAfter
                | DescendantsFlag::SelfBeforeAfter
        )
    }
}

fn depth(schema: &dyn SchemaReader, member: &Member) -> i32 {
    schema.depth(member)
}

fn check_hierarchy(
    function: &str,
    schema: &dyn SchemaReader,
    member: &Member,
    hierarchy: HierarchyId,
) -> EvalResult<()> {
    if member.hierarchy() == hierarchy {
        return Ok(());
    }
    Err(EvalError::hierarchy_mismatch(
        function,
        format!(
            "dimensions do not match: {} and {}",
            schema.hierarchy_unique_name(member.hierarchy()),
            schema.hierarchy_unique_name(hierarchy)
        ),
    ))
}

// ============================================================================
// Parents, children and siblings
// ============================================================================

pub fn parent(schema: &dyn SchemaReader, member: &Member) -> Member {
    schema
        .parent(member)
        .unwrap_or(Member::Null(member.hierarchy()))
}

pub fn first_child(schema: &dyn SchemaReader, member: &Member) -> Member {
    schema
        .children(member)
        .into_iter()
        .next()
        .unwrap_or(Member::Null(member.hierarchy()))
}

pub fn last_child(schema: &dyn SchemaReader, member: &Member) -> Member {
    schema
        .children(member)
        .pop()
        .unwrap_or(Member::Null(member.hierarchy()))
}

pub fn siblings(schema: &dyn SchemaReader, member: &Member) -> Vec<Member> {
    schema
        .siblings_and_index(member)
        .map(|(siblings, _)| siblings)
        .unwrap_or_default()
}

pub fn first_sibling(schema: &dyn SchemaReader, member: &Member) -> Member {
    siblings(schema, member)
        .into_iter()
        .next()
        .unwrap_or(Member::Null(member.hierarchy()))
}

pub fn last_sibling(schema: &dyn SchemaReader, member: &Member) -> Member {
    siblings(schema, member)
        .pop()
        .unwrap_or(Member::Null(member.hierarchy()))
}

pub fn is_leaf(schema: &dyn SchemaReader, member: &Member) -> bool {
    !member.is_null() && schema.children(member).is_empty()
}

/// `ancestor` is a strict ancestor of `member`
pub fn is_ancestor(schema: &dyn SchemaReader, ancestor: &Member, member: &Member) -> bool {
    if ancestor.is_null() || ancestor.hierarchy() != member.hierarchy() {
        return false;
    }
    let mut current = schema.parent(member);
    while let Some(m) = current {
        if &m == ancestor {
            return true;
        }
        current = schema.parent(&m);
    }
    false
}

/// Same parent and same level; a member is its own sibling
pub fn is_sibling(schema: &dyn SchemaReader, a: &Member, b: &Member) -> bool {
    !a.is_null()
        && !b.is_null()
        && a.hierarchy() == b.hierarchy()
        && schema.parent(a) == schema.parent(b)
        && schema.member_level(a) == schema.member_level(b)
}

/// `a` and `b` lie on one ancestor chain
pub fn same_chain(schema: &dyn SchemaReader, a: &Member, b: &Member) -> bool {
    a == b || is_ancestor(schema, a, b) || is_ancestor(schema, b, a)
}

/// Move `offset` positions among the siblings under the same parent
pub fn lag(schema: &dyn SchemaReader, member: &Member, offset: f64) -> Member {
    let null = Member::Null(member.hierarchy());
    let Some((siblings, index)) = schema.siblings_and_index(member) else {
        return null;
    };
    shift(siblings, index, -i128::from(offset as i64)).unwrap_or(null)
}

/// Move `offset` positions along all members of the member's level
pub fn level_offset(schema: &dyn SchemaReader, member: &Member, offset: i64) -> Member {
    let null = Member::Null(member.hierarchy());
    let Some(level) = schema.member_level(member) else {
        return null;
    };
    let members = schema.level_members(level);
    let Some(index) = members.iter().position(|m| m == member) else {
        return null;
    };
    shift(members, index, i128::from(offset)).unwrap_or(null)
}

fn shift(mut members: Vec<Member>, index: usize, offset: i128) -> Option<Member> {
    let target = i128::try_from(index).ok()? + offset;
    let target = usize::try_from(target).ok()?;
    if target < members.len() {
        Some(members.swap_remove(target))
    } else {
        None
    }
}

// ============================================================================
// Ancestors and descendants
// ============================================================================

/// Ancestor-or-self at `level`, or the null member when the member sits
/// above that level or the walk runs past the root
pub fn ancestor_at_level(
    schema: &dyn SchemaReader,
    member: &Member,
    level: LevelId,
) -> EvalResult<Member> {
    check_hierarchy("Ancestor", schema, member, level.hierarchy)?;
    let target = i32::from(level.depth);
    let mut current = member.clone();
    while depth(schema, &current) > target {
        match schema.parent(&current) {
            Some(parent) => current = parent,
            None => return Ok(Member::Null(member.hierarchy())),
        }
    }
    if depth(schema, &current) == target {
        Ok(current)
    } else {
        Ok(Member::Null(member.hierarchy()))
    }
}

pub fn ancestor_by_distance(schema: &dyn SchemaReader, member: &Member, distance: i64) -> Member {
    let null = Member::Null(member.hierarchy());
    if distance < 0 {
        return null;
    }
    let mut current = member.clone();
    for _ in 0..distance {
        match schema.parent(&current) {
            Some(parent) => current = parent,
            None => return null,
        }
    }
    current
}

/// The member followed by each of its ancestors up to the root
pub fn ascendants(schema: &dyn SchemaReader, member: &Member) -> Vec<Member> {
    let mut result = Vec::new();
    let mut current = (!member.is_null()).then(|| member.clone());
    while let Some(m) = current {
        current = schema.parent(&m);
        result.push(m);
    }
    result
}

/// Descendants of `member` relative to an absolute target depth
///
/// On each downward path the first member at or below `target` is the
/// "self" member (in a ragged hierarchy it may sit deeper than the target
/// level). Members above it are "before", members under it "after".
/// `LEAVES` adds childless members found above the target. Without a
/// target every leaf is returned.
pub fn descendants(
    schema: &dyn SchemaReader,
    member: &Member,
    target: Option<i32>,
    flag: DescendantsFlag,
) -> Vec<Member> {
    let mut result = Vec::new();
    if member.is_null() {
        return result;
    }
    let Some(target) = target else {
        collect_leaves(schema, member, &mut result);
        return result;
    };
    visit(schema, member, target, flag, &mut result);
    result
}

fn visit(
    schema: &dyn SchemaReader,
    member: &Member,
    target: i32,
    flag: DescendantsFlag,
    out: &mut Vec<Member>,
) {
    let children = schema.children(member);
    if depth(schema, member) >= target {
        if flag.includes_self() {
            out.push(member.clone());
        }
        if flag.includes_after() {
            for child in &children {
                collect_all(schema, child, out);
            }
        }
        return;
    }
    if flag.includes_before() || (flag == DescendantsFlag::Leaves && children.is_empty()) {
        out.push(member.clone());
    }
    for child in &children {
        visit(schema, child, target, flag, out);
    }
}

fn collect_all(schema: &dyn SchemaReader, member: &Member, out: &mut Vec<Member>) {
    out.push(member.clone());
    for child in schema.children(member) {
        collect_all(schema, &child, out);
    }
}

fn collect_leaves(schema: &dyn SchemaReader, member: &Member, out: &mut Vec<Member>) {
    let children = schema.children(member);
    if children.is_empty() {
        out.push(member.clone());
    }
    for child in &children {
        collect_leaves(schema, child, out);
    }
}

/// The member under `ancestor` at the same relative position as `member`
/// is under its own ancestor at `ancestor`'s level
pub fn cousin(schema: &dyn SchemaReader, member: &Member, ancestor: &Member) -> EvalResult<Member> {
    check_hierarchy("Cousin", schema, member, ancestor.hierarchy())?;
    let null = Member::Null(member.hierarchy());
    if member.is_null() || ancestor.is_null() {
        return Ok(null);
    }
    let target = depth(schema, ancestor);
    let mut path = Vec::new();
    let mut current = member.clone();
    while depth(schema, &current) > target {
        let Some((_, index)) = schema.siblings_and_index(&current) else {
            return Ok(null);
        };
        path.push(index);
        match schema.parent(&current) {
            Some(parent) => current = parent,
            None => return Ok(null),
        }
    }
    if depth(schema, &current) != target {
        return Ok(null);
    }

    let mut result = ancestor.clone();
    for index in path.into_iter().rev() {
        match schema.children(&result).into_iter().nth(index) {
            Some(child) => result = child,
            None => return Ok(null),
        }
    }
    Ok(result)
}

// ============================================================================
// Hierarchy and level members
// ============================================================================

/// Every stored member of a hierarchy in pre-order
pub fn hierarchy_members(schema: &dyn SchemaReader, hierarchy: HierarchyId) -> Vec<Member> {
    let mut result = Vec::new();
    if let Some(top) = schema.levels(hierarchy).first() {
        for root in schema.level_members(*top) {
            collect_all(schema, &root, &mut result);
        }
    }
    result
}

/// Level members from `from` to `to` inclusive, in level order
pub fn range(schema: &dyn SchemaReader, from: &Member, to: &Member) -> EvalResult<Vec<Member>> {
    check_hierarchy(":", schema, from, to.hierarchy())?;
    if from.is_null() || to.is_null() {
        return Ok(Vec::new());
    }
    let (Some(level), Some(other)) = (schema.member_level(from), schema.member_level(to)) else {
        return Ok(Vec::new());
    };
    if level != other {
        return Err(EvalError::invalid_argument(
            ":",
            format!(
                "members {} and {} are on different levels",
                schema.member_unique_name(from),
                schema.member_unique_name(to)
            ),
        ));
    }
    let members = schema.level_members(level);
    let (Some(a), Some(b)) = (
        members.iter().position(|m| m == from),
        members.iter().position(|m| m == to),
    ) else {
        return Ok(Vec::new());
    };
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    Ok(members[start..=end].to_vec())
}

// ============================================================================
// Time
// ============================================================================

/// Level of the member's parent, or the member's own level at the top
pub fn parent_level(schema: &dyn SchemaReader, member: &Member) -> Option<LevelId> {
    schema
        .parent(member)
        .and_then(|p| schema.member_level(&p))
        .or_else(|| schema.member_level(member))
}

/// First level of the hierarchy with the given kind
pub fn level_of_kind(
    schema: &dyn SchemaReader,
    hierarchy: HierarchyId,
    kind: LevelKind,
) -> Option<LevelId> {
    schema
        .levels(hierarchy)
        .into_iter()
        .find(|l| schema.level_kind(*l) == kind)
}

/// The member at the same position under the ancestor `offset` periods
/// earlier at `level`
pub fn parallel_period(
    schema: &dyn SchemaReader,
    level: LevelId,
    offset: f64,
    member: &Member,
) -> EvalResult<Member> {
    let ancestor = ancestor_at_level(schema, member, level)?;
    if ancestor.is_null() {
        return Ok(ancestor);
    }
    let shifted = level_offset(schema, &ancestor, (offset as i64).saturating_neg());
    if shifted.is_null() {
        return Ok(shifted);
    }
    cousin(schema, member, &shifted)
}

/// Descend from `member` to `level` along first (or last) children
pub fn boundary_period(
    schema: &dyn SchemaReader,
    level: LevelId,
    member: &Member,
    last: bool,
) -> EvalResult<Member> {
    check_hierarchy("OpeningPeriod", schema, member, level.hierarchy)?;
    let target = i32::from(level.depth);
    let mut current = member.clone();
    while !current.is_null() && depth(schema, &current) < target {
        current = if last {
            last_child(schema, &current)
        } else {
            first_child(schema, &current)
        };
    }
    if depth(schema, &current) == target {
        Ok(current)
    } else {
        Ok(Member::Null(member.hierarchy()))
    }
}

/// Members of `member`'s level under its ancestor at `level`, up to and
/// including `member`
pub fn periods_to_date(
    schema: &dyn SchemaReader,
    level: LevelId,
    member: &Member,
) -> EvalResult<Vec<Member>> {
    let ancestor = ancestor_at_level(schema, member, level)?;
    if ancestor.is_null() {
        return Ok(Vec::new());
    }
    let peers = descendants(
        schema,
        &ancestor,
        Some(depth(schema, member)),
        DescendantsFlag::SelfOnly,
    );
    let Some(end) = peers.iter().position(|m| m == member) else {
        return Ok(Vec::new());
    };
    Ok(peers[..=end].to_vec())
}

/// `count` members of the level ending at `member` (counting backwards
/// when `count` is negative), clipped to the level
pub fn last_periods(schema: &dyn SchemaReader, count: f64, member: &Member) -> Vec<Member> {
    let Some(level) = schema.member_level(member) else {
        return Vec::new();
    };
    let members = schema.level_members(level);
    let Some(index) = members.iter().position(|m| m == member) else {
        return Vec::new();
    };
    let count = count as i64;
    let index = index as i64;
    let (start, end) = match count {
        0 => return Vec::new(),
        n if n > 0 => (index.saturating_sub(n - 1), index),
        n => (index, index.saturating_add(n.saturating_neg() - 1)),
    };
    let start = start.max(0) as usize;
    let end = (end.min(members.len() as i64 - 1)) as usize;
    members[start..=end].to_vec()
}
