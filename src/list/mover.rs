use crate::common::error::MoveError;
use crate::proxy::model::{Rule, RuleKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// What a move resolves to, decided before any mutation: swap with a
/// visible sibling, enter an adjacent submenu from its near edge, or
/// leave the current submenu. Hidden rules are never move targets.
#[derive(Debug, PartialEq, Eq)]
enum MovePlan {
    SwapWithSibling(usize),
    EnterSubmenu(usize),
    LeaveSubmenu,
}

/// Move the rule at `path` (indices into nested `sub_rules` lists, root
/// first) one step up or down in the visible ordering. Returns the
/// rule's new path. `MoveError::NoTarget` means "can't move further".
pub fn move_rule(
    rules: &mut Vec<Rule>,
    path: &[usize],
    direction: Direction,
) -> Result<Vec<usize>, MoveError> {
    let (&idx, parent_path) = path.split_last().ok_or(MoveError::RuleNotFound)?;
    let siblings = list_at(rules, parent_path).ok_or(MoveError::RuleNotFound)?;
    if idx >= siblings.len() {
        return Err(MoveError::RuleNotFound);
    }

    let plan = plan_move(siblings, idx, direction).or_else(|| {
        // no eligible sibling: leaving the submenu is the fallback
        (!parent_path.is_empty()).then_some(MovePlan::LeaveSubmenu)
    });

    match plan {
        Some(MovePlan::SwapWithSibling(target)) => {
            siblings.swap(idx, target);
            let mut new_path = parent_path.to_vec();
            new_path.push(target);
            Ok(new_path)
        }
        Some(MovePlan::EnterSubmenu(target)) => {
            let rule = siblings.remove(idx);
            let target = if target > idx { target - 1 } else { target };
            let submenu = &mut siblings[target];
            let child_idx = match direction {
                // enter from the near edge
                Direction::Down => {
                    submenu.sub_rules.insert(0, rule);
                    0
                }
                Direction::Up => {
                    submenu.sub_rules.push(rule);
                    submenu.sub_rules.len() - 1
                }
            };
            let mut new_path = parent_path.to_vec();
            new_path.push(target);
            new_path.push(child_idx);
            Ok(new_path)
        }
        Some(MovePlan::LeaveSubmenu) => {
            let (&submenu_idx, grandparent_path) =
                parent_path.split_last().ok_or(MoveError::NoTarget)?;
            let rule = siblings.remove(idx);
            let outer = list_at(rules, grandparent_path).ok_or(MoveError::RuleNotFound)?;
            let insert_at = match direction {
                Direction::Up => submenu_idx,
                Direction::Down => submenu_idx + 1,
            };
            outer.insert(insert_at, rule);
            let mut new_path = grandparent_path.to_vec();
            new_path.push(insert_at);
            Ok(new_path)
        }
        None => Err(MoveError::NoTarget),
    }
}

fn plan_move(siblings: &[Rule], idx: usize, direction: Direction) -> Option<MovePlan> {
    let target = match direction {
        Direction::Down => (idx + 1..siblings.len()).find(|&i| siblings[i].is_visible),
        Direction::Up => (0..idx).rev().find(|&i| siblings[i].is_visible),
    }?;
    if siblings[target].kind == RuleKind::Submenu {
        Some(MovePlan::EnterSubmenu(target))
    } else {
        Some(MovePlan::SwapWithSibling(target))
    }
}

pub(crate) fn list_at<'a>(rules: &'a mut Vec<Rule>, path: &[usize]) -> Option<&'a mut Vec<Rule>> {
    let mut current = rules;
    for &idx in path {
        current = &mut current.get_mut(idx)?.sub_rules;
    }
    Some(current)
}
