//! Frame graph
//!
//! Each pass declares which render targets it samples and which it renders
//! to. The graph checks the declarations and produces an execution order in
//! which every target is written before it is read. Among passes that are
//! ready at the same time, the one added first runs first.

use std::collections::BTreeSet;

use thiserror::Error;

use super::targets::RenderTargetId;

/// Inconsistent pass declarations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameGraphError {
    /// A pass samples a target that no pass renders to
    #[error("pass '{pass}' reads '{target}' but no pass writes it")]
    UnproducedRead {
        /// Reading pass
        pass: &'static str,
        /// Target nobody writes
        target: RenderTargetId,
    },

    /// A pass both samples and renders to the same target
    #[error("pass '{pass}' both reads and writes '{target}'")]
    ReadWriteConflict {
        /// Offending pass
        pass: &'static str,
        /// Target used both ways
        target: RenderTargetId,
    },

    /// Two passes render to the same target
    #[error("'{target}' is written by both '{first}' and '{second}'")]
    DuplicateWriter {
        /// Contested target
        target: RenderTargetId,
        /// Pass added first
        first: &'static str,
        /// Pass added later
        second: &'static str,
    },

    /// The read/write dependencies form a loop
    #[error("passes form a dependency cycle: {}", passes.join(", "))]
    Cycle {
        /// Passes that could not be scheduled
        passes: Vec<&'static str>,
    },
}

/// Read and write sets of one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassDesc {
    /// Pass name used in logs and errors
    pub name: &'static str,
    /// Targets sampled by the pass
    pub reads: Vec<RenderTargetId>,
    /// Targets rendered to by the pass
    pub writes: Vec<RenderTargetId>,
}

impl PassDesc {
    /// Pass with no declared targets
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// Declare sampled targets
    pub fn reads(mut self, targets: &[RenderTargetId]) -> Self {
        self.reads.extend_from_slice(targets);
        self
    }

    /// Declare rendered targets
    pub fn writes(mut self, targets: &[RenderTargetId]) -> Self {
        self.writes.extend_from_slice(targets);
        self
    }
}

/// Collection of pass declarations
#[derive(Debug, Clone, Default)]
pub struct FrameGraph {
    passes: Vec<PassDesc>,
}

impl FrameGraph {
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pass and return its index
    pub fn add_pass(&mut self, pass: PassDesc) -> usize {
        self.passes.push(pass);
        self.passes.len() - 1
    }

    /// Declared passes in insertion order
    pub fn passes(&self) -> &[PassDesc] {
        &self.passes
    }

    /// Validate the declarations and return pass indices in execution order
    pub fn compile(&self) -> Result<Vec<usize>, FrameGraphError> {
        let mut writer: [Option<usize>; RenderTargetId::COUNT] = [None; RenderTargetId::COUNT];

        for (index, pass) in self.passes.iter().enumerate() {
            for &target in &pass.writes {
                if pass.reads.contains(&target) {
                    return Err(FrameGraphError::ReadWriteConflict {
                        pass: pass.name,
                        target,
                    });
                }
                let slot = &mut writer[target as usize];
                match *slot {
                    Some(first) if first != index => {
                        return Err(FrameGraphError::DuplicateWriter {
                            target,
                            first: self.passes[first].name,
                            second: pass.name,
                        });
                    }
                    _ => *slot = Some(index),
                }
            }
        }

        let count = self.passes.len();
        let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); count];
        let mut in_degree = vec![0usize; count];

        for (index, pass) in self.passes.iter().enumerate() {
            let mut producers = BTreeSet::new();
            for &target in &pass.reads {
                let producer = writer[target as usize].ok_or(FrameGraphError::UnproducedRead {
                    pass: pass.name,
                    target,
                })?;
                producers.insert(producer);
            }
            for producer in producers {
                if dependents[producer].insert(index) {
                    in_degree[index] += 1;
                }
            }
        }

        let mut ready: BTreeSet<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);

        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &dependent in &dependents[next] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != count {
            let passes = (0..count)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.passes[i].name)
                .collect();
            return Err(FrameGraphError::Cycle { passes });
        }

        log::debug!(
            "Frame graph order: {}",
            order
                .iter()
                .map(|&i| self.passes[i].name)
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RenderTargetId::*;

    fn deferred_passes() -> Vec<PassDesc> {
        vec![
            PassDesc::new("gbuffer").writes(&[Depth, Normal, Albedo, Srm, Velocity, Emissive]),
            PassDesc::new("ssao").reads(&[Depth, Normal]).writes(&[Ssao, SsaoBlur]),
            PassDesc::new("ssr").reads(&[Albedo, Depth, Normal, Srm]).writes(&[Ssr]),
            PassDesc::new("composition")
                .reads(&[Depth, Normal, Albedo, Srm, SsaoBlur, Ssr, Emissive])
                .writes(&[Composition]),
            PassDesc::new("dof").reads(&[Composition, Depth]).writes(&[Viewport]),
        ]
    }

    fn names(graph: &FrameGraph, order: &[usize]) -> Vec<&'static str> {
        order.iter().map(|&i| graph.passes()[i].name).collect()
    }

    #[test]
    fn test_declared_order_is_kept_when_valid() {
        let mut graph = FrameGraph::new();
        for pass in deferred_passes() {
            graph.add_pass(pass);
        }
        let order = graph.compile().unwrap();
        assert_eq!(names(&graph, &order), vec!["gbuffer", "ssao", "ssr", "composition", "dof"]);
    }

    #[test]
    fn test_shuffled_passes_are_ordered() {
        let mut passes = deferred_passes();
        passes.reverse();
        let mut graph = FrameGraph::new();
        for pass in passes {
            graph.add_pass(pass);
        }
        let order = graph.compile().unwrap();
        let names = names(&graph, &order);
        assert_eq!(names.first(), Some(&"gbuffer"));
        assert_eq!(names.last(), Some(&"dof"));
        let pos = |n: &str| names.iter().position(|&x| x == n).unwrap();
        assert!(pos("ssao") < pos("composition"));
        assert!(pos("ssr") < pos("composition"));
        // ssr was added before ssao, and both become ready together
        assert!(pos("ssr") < pos("ssao"));
    }

    #[test]
    fn test_unproduced_read_is_rejected() {
        let mut graph = FrameGraph::new();
        graph.add_pass(PassDesc::new("dof").reads(&[Composition]).writes(&[Viewport]));
        assert_eq!(
            graph.compile(),
            Err(FrameGraphError::UnproducedRead {
                pass: "dof",
                target: Composition
            })
        );
    }

    #[test]
    fn test_read_write_conflict_is_rejected() {
        let mut graph = FrameGraph::new();
        graph.add_pass(PassDesc::new("feedback").reads(&[Ssr]).writes(&[Ssr]));
        assert!(matches!(
            graph.compile(),
            Err(FrameGraphError::ReadWriteConflict { target: Ssr, .. })
        ));
    }

    #[test]
    fn test_duplicate_writer_is_rejected() {
        let mut graph = FrameGraph::new();
        graph.add_pass(PassDesc::new("a").writes(&[Albedo]));
        graph.add_pass(PassDesc::new("b").writes(&[Albedo]));
        assert_eq!(
            graph.compile(),
            Err(FrameGraphError::DuplicateWriter {
                target: Albedo,
                first: "a",
                second: "b"
            })
        );
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut graph = FrameGraph::new();
        graph.add_pass(PassDesc::new("root").writes(&[Depth]));
        graph.add_pass(PassDesc::new("a").reads(&[Depth, Ssr]).writes(&[Ssao]));
        graph.add_pass(PassDesc::new("b").reads(&[Ssao]).writes(&[Ssr]));
        match graph.compile() {
            Err(FrameGraphError::Cycle { passes }) => assert_eq!(passes, vec!["a", "b"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_graph_compiles() {
        assert_eq!(FrameGraph::new().compile(), Ok(Vec::new()));
    }
}
