use crate::block::InputKind;
use crate::{BlockId, ConnectionId, ConnectionKind, Workspace};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Validation severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValidationSeverity {
    Warning, // suspicious but legal
    Error,   // a structural invariant is broken
}

/// Validation issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub message: String,
    pub affected_blocks: Vec<BlockId>,
    pub issue_type: ValidationIssueType,
}

/// Types of validation issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationIssueType {
    /// A parent chain loops back on itself
    Cycle,
    /// A connection's partner does not point back
    AsymmetricLink,
    /// Linked connections are not of opposite kinds
    KindMismatch,
    /// Parent/child bookkeeping disagrees with the links or the root list
    ParentMismatch,
    /// Index membership or position is out of date
    StaleIndex,
    /// A block's connections disagree with its declared shape
    ShapeMismatch,
    /// A value block sits on the workspace with nothing consuming it
    NakedValue,
}

/// Complete validation result
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    pub fn add_issue(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    fn error(&mut self, issue_type: ValidationIssueType, message: String, affected_blocks: Vec<BlockId>) {
        self.add_issue(ValidationIssue {
            severity: ValidationSeverity::Error,
            message,
            affected_blocks,
            issue_type,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == ValidationSeverity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == ValidationSeverity::Warning)
    }

    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Error)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Warning)
            .collect()
    }

    pub fn of_type(&self, issue_type: ValidationIssueType) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.issue_type == issue_type)
            .collect()
    }

    /// No errors (warnings allowed)
    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }
}

/// Checks a workspace against the structural invariants of the block tree
pub struct Validator;

impl Validator {
    /// Run all validations on a workspace
    pub fn validate(workspace: &Workspace) -> ValidationResult {
        let mut result = ValidationResult::new();

        Self::check_cycles(workspace, &mut result);
        Self::check_family(workspace, &mut result);
        Self::check_links(workspace, &mut result);
        Self::check_shapes(workspace, &mut result);
        Self::check_indexes(workspace, &mut result);
        Self::check_naked_values(workspace, &mut result);

        result
    }

    /// Walk each parent chain; revisiting a block means it loops
    fn check_cycles(workspace: &Workspace, result: &mut ValidationResult) {
        let mut reported: HashSet<BlockId> = HashSet::new();
        for start in workspace.blocks.keys() {
            let mut seen = HashSet::new();
            let mut current = Some(*start);
            while let Some(id) = current {
                if !seen.insert(id) {
                    if !seen.iter().any(|m| reported.contains(m)) {
                        let mut members: Vec<BlockId> = seen.iter().copied().collect();
                        members.sort();
                        reported.extend(members.iter().copied());
                        result.error(
                            ValidationIssueType::Cycle,
                            format!("Parent chain of block {} loops back on itself", start.short()),
                            members,
                        );
                    }
                    break;
                }
                current = workspace.blocks.get(&id).and_then(|b| b.parent);
            }
        }
    }

    /// Parent and children lists agree, and the root list holds exactly the
    /// parentless blocks
    fn check_family(workspace: &Workspace, result: &mut ValidationResult) {
        for block in workspace.blocks.values() {
            match block.parent {
                Some(parent) => match workspace.blocks.get(&parent) {
                    Some(p) if p.children.contains(&block.id) => {}
                    Some(_) => result.error(
                        ValidationIssueType::ParentMismatch,
                        format!("Block {} is missing from its parent's children", block.id.short()),
                        vec![block.id, parent],
                    ),
                    None => result.error(
                        ValidationIssueType::ParentMismatch,
                        format!("Block {} has a parent that does not exist", block.id.short()),
                        vec![block.id],
                    ),
                },
                None if !workspace.top_blocks.contains(&block.id) => result.error(
                    ValidationIssueType::ParentMismatch,
                    format!("Root block {} is missing from the top blocks", block.id.short()),
                    vec![block.id],
                ),
                None => {}
            }

            for child in &block.children {
                let parent = workspace.blocks.get(child).and_then(|c| c.parent);
                if parent != Some(block.id) {
                    result.error(
                        ValidationIssueType::ParentMismatch,
                        format!("Child {} of block {} does not point back", child.short(), block.id.short()),
                        vec![block.id, *child],
                    );
                }
            }
        }

        let mut seen = HashSet::new();
        for id in &workspace.top_blocks {
            let is_root = workspace.blocks.get(id).is_some_and(|b| b.parent.is_none());
            if !is_root || !seen.insert(*id) {
                result.error(
                    ValidationIssueType::ParentMismatch,
                    format!("Top block entry {} is not a unique root", id.short()),
                    vec![*id],
                );
            }
        }
    }

    /// Links are symmetric, pair opposite kinds and match the parent edge
    fn check_links(workspace: &Workspace, result: &mut ValidationResult) {
        for connection in workspace.connections.values() {
            let Some(target) = connection.target else {
                continue;
            };
            let Some(partner) = workspace.connections.get(&target) else {
                result.error(
                    ValidationIssueType::AsymmetricLink,
                    format!("Connection {} points at a missing partner", connection.id.short()),
                    vec![connection.block],
                );
                continue;
            };
            if partner.target != Some(connection.id) {
                result.error(
                    ValidationIssueType::AsymmetricLink,
                    format!("Partner of connection {} does not point back", connection.id.short()),
                    vec![connection.block, partner.block],
                );
                continue;
            }
            if connection.kind.opposite() != partner.kind {
                result.error(
                    ValidationIssueType::KindMismatch,
                    format!(
                        "{:?} connection {} is linked to a {:?} connection",
                        connection.kind,
                        connection.id.short(),
                        partner.kind
                    ),
                    vec![connection.block, partner.block],
                );
                continue;
            }
            if connection.is_superior() {
                let child_parent = workspace.blocks.get(&partner.block).and_then(|b| b.parent);
                if child_parent != Some(connection.block) {
                    result.error(
                        ValidationIssueType::ParentMismatch,
                        format!(
                            "Block {} hangs from block {} but is not its child",
                            partner.block.short(),
                            connection.block.short()
                        ),
                        vec![connection.block, partner.block],
                    );
                }
            }
        }
    }

    /// Every connection a block names exists, belongs to it and has the
    /// kind its slot implies
    fn check_shapes(workspace: &Workspace, result: &mut ValidationResult) {
        for block in workspace.blocks.values() {
            if block.output.is_some() && block.previous.is_some() {
                result.error(
                    ValidationIssueType::ShapeMismatch,
                    format!("Block {} has both an output and a previous connection", block.id.short()),
                    vec![block.id],
                );
            }

            let mut slots: Vec<(ConnectionId, ConnectionKind)> = Vec::new();
            slots.extend(block.output.map(|c| (c, ConnectionKind::OutputValue)));
            slots.extend(block.previous.map(|c| (c, ConnectionKind::PreviousStatement)));
            slots.extend(block.next.map(|c| (c, ConnectionKind::NextStatement)));
            for input in &block.inputs {
                let expected = match input.kind {
                    InputKind::Value => ConnectionKind::InputValue,
                    InputKind::Statement => ConnectionKind::NextStatement,
                    InputKind::Dummy | InputKind::LocalVariable => {
                        if input.connection.is_some() {
                            result.error(
                                ValidationIssueType::ShapeMismatch,
                                format!("Input '{}' of block {} should have no connection", input.name, block.id.short()),
                                vec![block.id],
                            );
                        }
                        continue;
                    }
                };
                match input.connection {
                    Some(connection) => slots.push((connection, expected)),
                    None => result.error(
                        ValidationIssueType::ShapeMismatch,
                        format!("Input '{}' of block {} has no connection", input.name, block.id.short()),
                        vec![block.id],
                    ),
                }
            }

            for (id, kind) in slots {
                let fits = workspace
                    .connections
                    .get(&id)
                    .is_some_and(|c| c.block == block.id && c.kind == kind);
                if !fits {
                    result.error(
                        ValidationIssueType::ShapeMismatch,
                        format!("Block {} names a {:?} connection it does not own", block.id.short(), kind),
                        vec![block.id],
                    );
                }
            }
        }
    }

    /// A connection is indexed exactly when it is visible, at its current
    /// position, in the index of its own kind
    fn check_indexes(workspace: &Workspace, result: &mut ValidationResult) {
        let mut indexed: HashMap<ConnectionId, usize> = HashMap::new();
        for kind in ConnectionKind::ALL {
            let entries = workspace.index(kind).entries();
            if entries.windows(2).any(|w| w[0].position.y > w[1].position.y) {
                result.error(
                    ValidationIssueType::StaleIndex,
                    format!("{:?} index is out of order", kind),
                    vec![],
                );
            }
            for entry in entries {
                *indexed.entry(entry.id).or_default() += 1;
                match workspace.connections.get(&entry.id) {
                    Some(c) if c.kind == kind && c.position == entry.position => {}
                    Some(c) => result.error(
                        ValidationIssueType::StaleIndex,
                        format!("Index entry for connection {} is out of date", entry.id.short()),
                        vec![c.block],
                    ),
                    None => result.error(
                        ValidationIssueType::StaleIndex,
                        format!("Index holds unknown connection {}", entry.id.short()),
                        vec![],
                    ),
                }
            }
        }

        for connection in workspace.connections.values() {
            let count = indexed.get(&connection.id).copied().unwrap_or(0);
            let expected = usize::from(!connection.hidden);
            if count != expected || connection.in_index == connection.hidden {
                result.error(
                    ValidationIssueType::StaleIndex,
                    format!(
                        "Connection {} is indexed {} time(s) but is {}",
                        connection.id.short(),
                        count,
                        if connection.hidden { "hidden" } else { "visible" }
                    ),
                    vec![connection.block],
                );
            }
        }
    }

    fn check_naked_values(workspace: &Workspace, result: &mut ValidationResult) {
        for id in &workspace.top_blocks {
            let Some(block) = workspace.blocks.get(id) else {
                continue;
            };
            if block.output.is_some() {
                result.add_issue(ValidationIssue {
                    severity: ValidationSeverity::Warning,
                    message: format!("Value block '{}' is not plugged into anything", block.block_type()),
                    affected_blocks: vec![block.id],
                    issue_type: ValidationIssueType::NakedValue,
                });
            }
        }
    }
}

/// Extension trait for Workspace to add validation
pub trait ValidatedWorkspace {
    fn validate(&self) -> ValidationResult;

    /// Worst severity reported against each block
    fn blocks_with_issues(&self, result: &ValidationResult) -> HashMap<BlockId, ValidationSeverity>;
}

impl ValidatedWorkspace for Workspace {
    fn validate(&self) -> ValidationResult {
        Validator::validate(self)
    }

    fn blocks_with_issues(&self, result: &ValidationResult) -> HashMap<BlockId, ValidationSeverity> {
        let mut blocks = HashMap::new();

        for issue in &result.issues {
            for block_id in &issue.affected_blocks {
                blocks
                    .entry(*block_id)
                    .and_modify(|severity| {
                        if issue.severity > *severity {
                            *severity = issue.severity;
                        }
                    })
                    .or_insert(issue.severity);
            }
        }

        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(ws: &mut Workspace, count: usize) -> Vec<BlockId> {
        let blocks: Vec<BlockId> = (0..count).map(|_| ws.new_block("led").unwrap()).collect();
        for pair in blocks.windows(2) {
            let next = ws.block(pair[0]).unwrap().next_connection().unwrap();
            let prev = ws.block(pair[1]).unwrap().previous_connection().unwrap();
            ws.connect(next, prev).unwrap();
        }
        blocks
    }

    #[test]
    fn test_valid_workspace() {
        let mut ws = Workspace::new();
        stack(&mut ws, 3);
        let loop_block = ws.new_block("controls_while").unwrap();
        ws.set_collapsed(loop_block, true).unwrap();

        let result = Validator::validate(&ws);
        assert!(result.is_valid(), "{:?}", result.issues);
        assert!(!result.has_warnings());
    }

    #[test]
    fn test_naked_value_warning() {
        let mut ws = Workspace::new();
        let number = ws.new_block("math_number").unwrap();

        let result = ws.validate();
        assert!(result.is_valid());
        let warnings = result.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].issue_type, ValidationIssueType::NakedValue);
        assert_eq!(warnings[0].affected_blocks, vec![number]);
    }

    #[test]
    fn test_asymmetric_link() {
        let mut ws = Workspace::new();
        let blocks = stack(&mut ws, 2);
        let next = ws.block(blocks[0]).unwrap().next_connection().unwrap();
        let prev = ws.block(blocks[1]).unwrap().previous_connection().unwrap();
        ws.connection_mut(prev).unwrap().target = None;

        let result = Validator::validate(&ws);
        let issues = result.of_type(ValidationIssueType::AsymmetricLink);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].affected_blocks.contains(&blocks[0]));
        assert_eq!(ws.connection(next).unwrap().target(), Some(prev));
    }

    #[test]
    fn test_cycle_detected() {
        let mut ws = Workspace::new();
        let blocks = stack(&mut ws, 2);
        ws.block_mut(blocks[0]).unwrap().parent = Some(blocks[1]);

        let result = Validator::validate(&ws);
        assert!(!result.of_type(ValidationIssueType::Cycle).is_empty());
        assert!(!result.of_type(ValidationIssueType::ParentMismatch).is_empty());
    }

    #[test]
    fn test_stale_index_after_raw_move() {
        let mut ws = Workspace::new();
        let block = ws.new_block("led").unwrap();
        let next = ws.block(block).unwrap().next_connection().unwrap();
        ws.connection_mut(next).unwrap().position.y += 50.0;

        let result = Validator::validate(&ws);
        assert_eq!(result.of_type(ValidationIssueType::StaleIndex).len(), 1);
    }

    #[test]
    fn test_shape_mismatch() {
        let mut ws = Workspace::new();
        let a = ws.new_block("led").unwrap();
        let b = ws.new_block("led").unwrap();
        let foreign = ws.block(b).unwrap().next_connection().unwrap();
        ws.block_mut(a).unwrap().next = Some(foreign);

        let result = Validator::validate(&ws);
        let issues = result.of_type(ValidationIssueType::ShapeMismatch);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].affected_blocks, vec![a]);
    }

    #[test]
    fn test_blocks_with_issues_keeps_worst() {
        let mut ws = Workspace::new();
        let number = ws.new_block("math_number").unwrap();
        let output = ws.block(number).unwrap().output_connection().unwrap();
        ws.connection_mut(output).unwrap().position.x += 1.0;

        let result = ws.validate();
        let flagged = ws.blocks_with_issues(&result);
        assert_eq!(flagged[&number], ValidationSeverity::Error);
    }
}
