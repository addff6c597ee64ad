//! Derivative algebra
//!
//! A [`Derivative`] is the derivative of some (scalar or vector) quantity
//! with respect to the DOFs of every node it depends on. It is stored
//! sparsely, one matrix per node:
//!
//! ```text
//! terms[node] : rows x (full local DOF count of node)
//! ```
//!
//! Partials are always taken with respect to the node's *full* local DOF
//! vector. Whether a DOF is fixed only matters when the derivative is
//! [projected](Derivative::project) onto a target node, which selects the
//! free columns in the target's DOF ordering. This keeps a derivative valid
//! across fix/unfix.
//!
//! Combinators build their derivatives with the chain rule: scale each
//! child's derivative by the partial of the combinator with respect to that
//! child (a scalar via `*`, a Jacobian via [`Derivative::left_mul`]) and add
//! the results. Addition merges terms of the same node by summation, so a
//! node reached through several branches is counted with the correct total
//! weight, once.

use crate::error::{Result, StelloptError};
use crate::graph::{Graph, NodeId};
use ndarray::{s, Array1, Array2, Axis};
use std::collections::BTreeMap;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// Sparse derivative of a quantity with `rows` outputs with respect to node DOFs.
#[derive(Debug, Clone, PartialEq)]
pub struct Derivative {
    rows: usize,
    terms: BTreeMap<NodeId, Array2<f64>>,
}

impl Derivative {
    /// The derivative of a quantity that depends on nothing.
    pub fn zeros(rows: usize) -> Self {
        Self {
            rows,
            terms: BTreeMap::new(),
        }
    }

    /// The derivative of a quantity with respect to the local DOFs of one node.
    ///
    /// `partial` is `rows x (full local DOF count)`. Nodes without DOFs
    /// contribute no term.
    pub fn local(node: NodeId, partial: Array2<f64>) -> Self {
        let rows = partial.nrows();
        let mut terms = BTreeMap::new();
        if partial.ncols() > 0 {
            terms.insert(node, partial);
        }
        Self { rows, terms }
    }

    /// Scalar version of [`Derivative::local`].
    pub fn local_gradient(node: NodeId, gradient: Array1<f64>) -> Self {
        Self::local(node, gradient.insert_axis(Axis(0)))
    }

    /// Build a scalar derivative from a gradient given in the node's
    /// *current free* DOF layout. Fixed DOFs get zero partials.
    ///
    /// Fails with `ShapeMismatch` if the gradient was computed for a
    /// different free layout (for example before a fix/unfix).
    pub fn from_free_gradient(graph: &Graph, node: NodeId, gradient: &Array1<f64>) -> Result<Self> {
        let dofs = graph.dofs(node)?.ok_or_else(|| {
            StelloptError::ShapeMismatch(format!("node {} owns no DOFs", node))
        })?;
        let free = dofs.free_indices();
        if gradient.len() != free.len() {
            return Err(StelloptError::ShapeMismatch(format!(
                "gradient has {} entries but node {} has {} free DOFs",
                gradient.len(),
                node,
                free.len()
            )));
        }

        let mut partial = Array2::zeros((1, dofs.len()));
        for (k, &i) in free.iter().enumerate() {
            partial[[0, i]] = gradient[k];
        }
        Ok(Self::local(node, partial))
    }

    /// Number of outputs of the differentiated quantity.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// `true` if no node has a stored partial.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Nodes with a stored partial, in id order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.terms.keys().copied()
    }

    /// The stored partial for `node`, if any.
    pub fn term(&self, node: NodeId) -> Option<&Array2<f64>> {
        self.terms.get(&node)
    }

    /// The partial with respect to the full local DOFs of `node`, or zeros
    /// of the right shape if the quantity does not depend on it.
    pub fn derivative_of(&self, graph: &Graph, node: NodeId) -> Result<Array2<f64>> {
        let len = graph.dofs(node)?.map(|d| d.len()).unwrap_or(0);
        match self.terms.get(&node) {
            Some(term) if term.ncols() == len => Ok(term.clone()),
            Some(term) => Err(StelloptError::ShapeMismatch(format!(
                "partial for node {} has {} columns, node has {} DOFs",
                node,
                term.ncols(),
                len
            ))),
            None => Ok(Array2::zeros((self.rows, len))),
        }
    }

    /// Term-by-term sum. Terms of the same node are added.
    pub fn checked_add(&self, other: &Derivative) -> Result<Derivative> {
        if self.rows != other.rows {
            return Err(StelloptError::ShapeMismatch(format!(
                "cannot add derivatives with {} and {} rows",
                self.rows, other.rows
            )));
        }

        let mut out = self.clone();
        for (node, term) in &other.terms {
            match out.terms.get_mut(node) {
                Some(existing) if existing.dim() == term.dim() => *existing += term,
                Some(existing) => {
                    return Err(StelloptError::ShapeMismatch(format!(
                        "partials for node {} have shapes {:?} and {:?}",
                        node,
                        existing.dim(),
                        term.dim()
                    )))
                }
                None => {
                    out.terms.insert(*node, term.clone());
                }
            }
        }
        Ok(out)
    }

    /// Multiply every term by a scalar.
    pub fn scale(&self, factor: f64) -> Derivative {
        Derivative {
            rows: self.rows,
            terms: self
                .terms
                .iter()
                .map(|(node, term)| (*node, term * factor))
                .collect(),
        }
    }

    /// Chain rule through a Jacobian: if this is `dg` and `m = df/dg`
    /// (`new_rows x rows`), returns `df = m · dg`.
    pub fn left_mul(&self, m: &Array2<f64>) -> Result<Derivative> {
        if m.ncols() != self.rows {
            return Err(StelloptError::ShapeMismatch(format!(
                "cannot apply a {}x{} Jacobian to a derivative with {} rows",
                m.nrows(),
                m.ncols(),
                self.rows
            )));
        }

        Ok(Derivative {
            rows: m.nrows(),
            terms: self
                .terms
                .iter()
                .map(|(node, term)| (*node, m.dot(term)))
                .collect(),
        })
    }

    /// Chain rule through a gradient row: `df = weights · dg`, with one output.
    pub fn contract(&self, weights: &Array1<f64>) -> Result<Derivative> {
        self.left_mul(&weights.view().insert_axis(Axis(0)).to_owned())
    }

    /// The derivative of output `i` alone.
    pub fn row(&self, i: usize) -> Result<Derivative> {
        if i >= self.rows {
            return Err(StelloptError::ShapeMismatch(format!(
                "row {} requested from a derivative with {} rows",
                i, self.rows
            )));
        }

        Ok(Derivative {
            rows: 1,
            terms: self
                .terms
                .iter()
                .map(|(node, term)| (*node, term.slice(s![i..i + 1, ..]).to_owned()))
                .collect(),
        })
    }

    /// Stack derivatives vertically, as for concatenated outputs.
    pub fn stack(parts: &[Derivative]) -> Result<Derivative> {
        let rows: usize = parts.iter().map(|p| p.rows).sum();

        let mut widths: BTreeMap<NodeId, usize> = BTreeMap::new();
        for part in parts {
            for (node, term) in &part.terms {
                let width = *widths.entry(*node).or_insert(term.ncols());
                if width != term.ncols() {
                    return Err(StelloptError::ShapeMismatch(format!(
                        "partials for node {} have {} and {} columns",
                        node,
                        width,
                        term.ncols()
                    )));
                }
            }
        }

        let mut terms = BTreeMap::new();
        for (node, width) in widths {
            let mut stacked = Array2::zeros((rows, width));
            let mut offset = 0;
            for part in parts {
                if let Some(term) = part.terms.get(&node) {
                    stacked
                        .slice_mut(s![offset..offset + part.rows, ..])
                        .assign(term);
                }
                offset += part.rows;
            }
            terms.insert(node, stacked);
        }

        Ok(Derivative { rows, terms })
    }

    /// Project onto the free-DOF ordering of `target`.
    ///
    /// Returns a `rows x graph.free_count(target)` matrix whose columns
    /// follow [`Graph::free_vector`]. Nodes in the dependency closure of
    /// `target` without a stored partial contribute zeros; fixed DOFs are
    /// omitted; partials of nodes outside the closure are ignored.
    pub fn project(&self, graph: &Graph, target: NodeId) -> Result<Array2<f64>> {
        let layout = graph.dof_layout(target)?;
        let total: usize = layout.iter().map(|b| b.free.len()).sum();
        let mut out = Array2::zeros((self.rows, total));

        for block in &layout {
            let Some(term) = self.terms.get(&block.node) else {
                continue;
            };
            if term.ncols() != block.local_len || term.nrows() != self.rows {
                return Err(StelloptError::ShapeMismatch(format!(
                    "partial for node {} is {}x{}, expected {}x{}",
                    block.node,
                    term.nrows(),
                    term.ncols(),
                    self.rows,
                    block.local_len
                )));
            }
            for (k, &i) in block.free.iter().enumerate() {
                out.column_mut(block.offset + k).assign(&term.column(i));
            }
        }

        Ok(out)
    }

    /// Scalar version of [`Derivative::project`].
    pub fn gradient(&self, graph: &Graph, target: NodeId) -> Result<Array1<f64>> {
        if self.rows != 1 {
            return Err(StelloptError::ShapeMismatch(format!(
                "gradient requested from a derivative with {} rows",
                self.rows
            )));
        }
        Ok(self.project(graph, target)?.index_axis_move(Axis(0), 0))
    }
}

impl AddAssign<&Derivative> for Derivative {
    /// # Panics
    ///
    /// Panics if the derivatives have different row counts or the partials
    /// of a shared node have different shapes. Use [`Derivative::checked_add`]
    /// to get an error instead.
    fn add_assign(&mut self, other: &Derivative) {
        assert_eq!(self.rows, other.rows, "derivative row counts differ");
        for (node, term) in &other.terms {
            match self.terms.get_mut(node) {
                Some(existing) => *existing += term,
                None => {
                    self.terms.insert(*node, term.clone());
                }
            }
        }
    }
}

impl AddAssign for Derivative {
    fn add_assign(&mut self, other: Derivative) {
        *self += &other;
    }
}

impl Add for Derivative {
    type Output = Derivative;

    fn add(mut self, other: Derivative) -> Derivative {
        self += &other;
        self
    }
}

impl Add<&Derivative> for &Derivative {
    type Output = Derivative;

    fn add(self, other: &Derivative) -> Derivative {
        let mut out = self.clone();
        out += other;
        out
    }
}

impl Neg for Derivative {
    type Output = Derivative;

    fn neg(self) -> Derivative {
        self.scale(-1.0)
    }
}

impl Sub for Derivative {
    type Output = Derivative;

    fn sub(self, other: Derivative) -> Derivative {
        self + (-other)
    }
}

impl Mul<f64> for Derivative {
    type Output = Derivative;

    fn mul(self, factor: f64) -> Derivative {
        self.scale(factor)
    }
}

impl Mul<f64> for &Derivative {
    type Output = Derivative;

    fn mul(self, factor: f64) -> Derivative {
        self.scale(factor)
    }
}

impl Mul<Derivative> for f64 {
    type Output = Derivative;

    fn mul(self, derivative: Derivative) -> Derivative {
        derivative.scale(self)
    }
}
