//! Addressing of path occurrences.
//!
//! While the tree is walked, the walker pushes statements, clause markers and
//! every visited expression node onto a stack. Each time it reaches a path
//! (a path, source or treat used as an expression) it allocates a
//! [`PathIdentity`]: the stack snapshot plus a per-path repeat position, so the
//! same path object reached twice gets two identities.
//!
//! The primary allocator records every identity of one compilation. A replay
//! allocator re-derives identities while a renderer walks the same tree again
//! and fails as soon as the two walks diverge.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use super::errors::CompileError;
use crate::tree::{NodeId, StatementKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Clause {
    Selection,
    OnTree,
    Assignments,
    Restriction,
    GroupList,
    GroupRestriction,
    OrderList,
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Selection => write!(f, "selection"),
            Clause::OnTree => write!(f, "on"),
            Clause::Assignments => write!(f, "assignments"),
            Clause::Restriction => write!(f, "restriction"),
            Clause::GroupList => write!(f, "group_list"),
            Clause::GroupRestriction => write!(f, "group_restriction"),
            Clause::OrderList => write!(f, "order_list"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackEntry {
    Statement(NodeId, StatementKind),
    Clause(Clause),
    /// A tuple selection; its members still count as directly selected.
    Compound(NodeId),
    Node(NodeId),
}

impl fmt::Display for StackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackEntry::Statement(node, kind) => write!(f, "{}{}", kind, node),
            StackEntry::Clause(clause) => write!(f, "{}", clause),
            StackEntry::Compound(node) => write!(f, "tuple{}", node),
            StackEntry::Node(node) => write!(f, "{}", node),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathIdentity {
    node: NodeId,
    stack: Rc<[StackEntry]>,
    position: u32,
    directly_selected: bool,
}

impl PathIdentity {
    /// The path node this identity addresses.
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn stack(&self) -> &[StackEntry] {
        &self.stack
    }

    /// Whether the path sits directly in the selection of the top-level
    /// query, possibly inside one tuple.
    pub fn is_directly_selected(&self) -> bool {
        self.directly_selected
    }

    fn compute_directly_selected(stack: &[StackEntry]) -> bool {
        let Some(mut index) = stack.len().checked_sub(2) else {
            return false;
        };
        if matches!(stack[index], StackEntry::Compound(_)) {
            let Some(outer) = index.checked_sub(1) else {
                return false;
            };
            index = outer;
        }
        matches!(stack[index], StackEntry::Clause(Clause::Selection))
            && index
                .checked_sub(1)
                .is_some_and(|s| matches!(stack[s], StackEntry::Statement(_, StatementKind::Query)))
    }
}

impl PartialEq for PathIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position && self.stack == other.stack
    }
}

impl Eq for PathIdentity {}

impl Hash for PathIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.stack.hash(state);
        self.position.hash(state);
    }
}

impl fmt::Display for PathIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.stack.iter().map(|e| e.to_string()).collect();
        write!(f, "{}@{}", parts.join("/"), self.position)
    }
}

#[derive(Debug, Clone)]
enum AllocatorMode {
    Primary { allocated: Vec<PathIdentity> },
    Replay { expected: Rc<[PathIdentity]>, cursor: usize },
}

#[derive(Debug, Clone)]
pub struct PathIdAllocator {
    stack: Vec<StackEntry>,
    positions: HashMap<NodeId, u32>,
    mode: AllocatorMode,
}

impl PathIdAllocator {
    pub fn primary() -> Self {
        PathIdAllocator {
            stack: Vec::new(),
            positions: HashMap::new(),
            mode: AllocatorMode::Primary {
                allocated: Vec::new(),
            },
        }
    }

    pub(crate) fn replay(expected: Rc<[PathIdentity]>) -> Self {
        PathIdAllocator {
            stack: Vec::new(),
            positions: HashMap::new(),
            mode: AllocatorMode::Replay {
                expected,
                cursor: 0,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn peek(&self) -> Option<StackEntry> {
        self.stack.last().copied()
    }

    pub fn push(&mut self, entry: StackEntry) -> Result<(), CompileError> {
        let top = self.stack.last();
        let violation = match entry {
            StackEntry::Statement(_, kind) if kind.is_top_level() => {
                top.map(|_| "a top-level statement must be the bottom of the stack")
            }
            StackEntry::Statement(..) => match top {
                None => Some("a subquery cannot be the bottom of the stack"),
                Some(StackEntry::Statement(..)) => Some("a subquery must be nested in a clause"),
                Some(_) => None,
            },
            StackEntry::Clause(_) => match top {
                Some(StackEntry::Statement(..)) => None,
                None => Some("a clause cannot be the bottom of the stack"),
                Some(_) => Some("a clause must directly follow a statement"),
            },
            StackEntry::Compound(_) | StackEntry::Node(_) => match top {
                None => Some("an expression cannot be the bottom of the stack"),
                Some(StackEntry::Statement(..)) => Some("an expression must be nested in a clause"),
                Some(_) => None,
            },
        };
        if let Some(reason) = violation {
            return Err(CompileError::InvalidStackPush {
                entry: entry.to_string(),
                reason,
            });
        }
        self.stack.push(entry);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<StackEntry, CompileError> {
        self.stack.pop().ok_or(CompileError::EmptyPathStack)
    }

    /// Allocates the identity of the path on top of the stack.
    pub fn allocate(&mut self) -> Result<PathIdentity, CompileError> {
        let node = match self.stack.last() {
            None => return Err(CompileError::EmptyPathStack),
            Some(StackEntry::Node(node)) => *node,
            Some(other) => {
                return Err(CompileError::NotAPath {
                    entry: other.to_string(),
                })
            }
        };
        let position = match self.positions.get_mut(&node) {
            Some(count) => {
                *count += 1;
                *count
            }
            None => {
                self.positions.insert(node, 0);
                0
            }
        };
        let stack: Rc<[StackEntry]> = self.stack.as_slice().into();
        let identity = PathIdentity {
            node,
            directly_selected: PathIdentity::compute_directly_selected(&stack),
            stack,
            position,
        };
        match &mut self.mode {
            AllocatorMode::Primary { allocated } => {
                allocated.push(identity.clone());
                Ok(identity)
            }
            AllocatorMode::Replay { expected, cursor } => {
                let Some(primary) = expected.get(*cursor) else {
                    return Err(CompileError::PathIdentityOverflow {
                        allocated: expected.len(),
                    });
                };
                if *primary != identity {
                    return Err(CompileError::PathIdentityMismatch {
                        expected: primary.to_string(),
                        found: identity.to_string(),
                    });
                }
                *cursor += 1;
                Ok(primary.clone())
            }
        }
    }

    /// Identities allocated so far, in allocation order.
    pub fn identities(&self) -> &[PathIdentity] {
        match &self.mode {
            AllocatorMode::Primary { allocated } => allocated,
            AllocatorMode::Replay { expected, .. } => expected,
        }
    }

    /// A fresh replay allocator checking against the primary identities.
    pub fn replay_allocator(&self) -> PathIdAllocator {
        match &self.mode {
            AllocatorMode::Primary { allocated } => Self::replay(allocated.as_slice().into()),
            AllocatorMode::Replay { expected, .. } => Self::replay(Rc::clone(expected)),
        }
    }

    /// Replay allocators are exhausted once every primary identity was
    /// re-derived; primary allocators always are.
    pub fn is_exhausted(&self) -> bool {
        match &self.mode {
            AllocatorMode::Primary { .. } => true,
            AllocatorMode::Replay { expected, cursor } => *cursor == expected.len(),
        }
    }

    pub(crate) fn into_identities(self) -> Rc<[PathIdentity]> {
        match self.mode {
            AllocatorMode::Primary { allocated } => allocated.into(),
            AllocatorMode::Replay { expected, .. } => expected,
        }
    }
}
