//! # Node Art
//!
//! Per-row Unicode box-drawing for a partially-ordered DAG. Each node owns
//! one column in its row; outgoing edges run straight up from that column,
//! incoming edges make a right angle in the row, and an arrowhead next to
//! the node column shows direction. Odd output positions are gap columns
//! used for arrowheads and the dashes that mark edges crossing without
//! connecting.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use crate::dag::Dag;
use crate::order::partially_ordered;

/// Box-drawing characters indexed by `up | right<<1 | down<<2 | left<<3`.
const BOX_CHARS: [char; 16] = [
  ' ', '╵', '╶', '└', '╷', '│', '┌', '├', '╴', '┘', '─', '┴', '┐', '┤', '┬', '┼',
];

/// One row of the rendered graph.
///
/// `at` is the column owning the node; `up` and `down` are columns with
/// edges leaving towards earlier and later rows; `through` are columns
/// whose edges pass this row without connecting.
#[derive(Clone, PartialEq, Eq)]
pub struct NodeArt {
  pub at: usize,
  pub up: BTreeSet<usize>,
  pub down: BTreeSet<usize>,
  pub through: BTreeSet<usize>,
}

impl NodeArt {
  pub fn new<U, D, P>(at: usize, up: U, down: D, through: P) -> NodeArt
  where
    U: IntoIterator<Item = usize>,
    D: IntoIterator<Item = usize>,
    P: IntoIterator<Item = usize>,
  {
    let art = NodeArt {
      at,
      up: up.into_iter().collect(),
      down: down.into_iter().collect(),
      through: through.into_iter().collect(),
    };
    debug_assert!(
      art.through.is_disjoint(&art.up) && art.through.is_disjoint(&art.down),
      "through columns must not carry connected edges",
    );
    art
  }

  fn min_col(&self) -> usize {
    [
      Some(self.at),
      self.up.first().copied(),
      self.down.first().copied(),
    ]
    .into_iter()
    .flatten()
    .min()
    .unwrap_or(self.at)
  }

  fn max_col(&self) -> usize {
    [
      Some(self.at),
      self.up.last().copied(),
      self.down.last().copied(),
    ]
    .into_iter()
    .flatten()
    .max()
    .unwrap_or(self.at)
  }

  fn cols(&self) -> usize {
    self.max_col().max(self.through.last().copied().unwrap_or(0)) + 1
  }

  fn first_codepoint(&self, column: usize) -> char {
    let (up, down, left, right);
    if self.through.contains(&column) {
      up = true;
      down = true;
      left = false;
      right = false;
    } else {
      up = self.up.contains(&column);
      down = self.down.contains(&column);
      let min = self.min_col();
      let max = self.max_col();
      if min == column && column == max {
        left = true;
        right = true;
      } else if self.at == column && self.down.contains(&column) {
        left = true;
        right = true;
      } else {
        left = min < column && column <= max;
        right = min <= column && column < max;
      }
    }
    BOX_CHARS[usize::from(up) | usize::from(right) << 1 | usize::from(down) << 2 | usize::from(left) << 3]
  }

  fn second_codepoint(&self, column: usize) -> Option<char> {
    if column + 1 >= self.cols() {
      return None;
    }
    let min = self.min_col();
    let max = self.max_col();
    if min <= column && column < max {
      if column + 1 == self.at {
        Some('▶')
      } else if column == self.at {
        Some('◀')
      } else if self.through.contains(&column) || self.through.contains(&(column + 1)) {
        Some('┄')
      } else {
        Some('─')
      }
    } else {
      Some(' ')
    }
  }
}

impl fmt::Display for NodeArt {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for column in 0..self.cols() {
      write!(f, "{}", self.first_codepoint(column))?;
      if let Some(gap) = self.second_codepoint(column) {
        write!(f, "{gap}")?;
      }
    }
    Ok(())
  }
}

impl fmt::Debug for NodeArt {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "NodeArt(at = {}", self.at)?;
    if !self.up.is_empty() {
      write!(f, ", up = {:?}", self.up)?;
    }
    if !self.down.is_empty() {
      write!(f, ", down = {:?}", self.down)?;
    }
    if !self.through.is_empty() {
      write!(f, ", through = {:?}", self.through)?;
    }
    write!(f, ")")
  }
}

/// Assigns a column to every node and derives each row's art.
///
/// `nodes` must be partially ordered for the DAG: edges point up the list,
/// so the walk runs bottom-up and a node's parents already hold columns
/// when the node is reached.
pub fn add_node_art<T: Eq + Hash + Clone>(nodes: &[T], dag: &Dag<T>) -> Vec<(NodeArt, T)> {
  let mut columns: HashMap<T, usize> = HashMap::new();
  let mut active: Vec<Option<T>> = Vec::new();
  let mut reached: HashSet<T> = HashSet::new();
  let mut grid = Vec::with_capacity(nodes.len());

  for node in nodes.iter().rev() {
    reached.insert(node.clone());
    let parents = dag.parents_of(node);

    let finished_parents: Vec<&T> = parents
      .iter()
      .copied()
      .filter(|p| dag.children_of(p).iter().all(|c| reached.contains(*c)))
      .collect();
    let at = finished_parents
      .iter()
      .filter_map(|p| columns.get(*p).copied())
      .min()
      .unwrap_or(active.len());
    columns.insert(node.clone(), at);

    let down: BTreeSet<usize> = parents.iter().filter_map(|p| columns.get(*p).copied()).collect();

    for parent in &parents {
      if dag.children_of(parent).iter().all(|c| columns.contains_key(*c)) {
        if let Some(&col) = columns.get(*parent) {
          if let Some(slot) = active.get_mut(col) {
            *slot = None;
          }
        }
      }
    }

    let through: BTreeSet<usize> = active
      .iter()
      .enumerate()
      .filter(|(idx, slot)| slot.is_some() && *idx != at && !down.contains(idx))
      .map(|(idx, _)| idx)
      .collect();

    if !dag.children_of(node).is_empty() {
      while active.len() <= at {
        active.push(None);
      }
      active[at] = Some(node.clone());
    }

    let up: BTreeSet<usize> = active
      .iter()
      .enumerate()
      .filter(|(idx, slot)| slot.is_some() && !through.contains(idx))
      .map(|(idx, _)| idx)
      .collect();

    while active.last().is_some_and(Option::is_none) {
      active.pop();
    }

    grid.push((NodeArt { at, up, down, through }, node.clone()));
  }

  grid.reverse();
  grid
}

/// Partially orders the DAG and renders each node's row art.
pub fn layout<T, K, F>(dag: &Dag<T>, key: F) -> Vec<(NodeArt, T)>
where
  T: Eq + Hash + Clone,
  K: Ord + Clone,
  F: Fn(&T) -> K,
{
  let order = partially_ordered(dag, key);
  add_node_art(&order, dag)
}
