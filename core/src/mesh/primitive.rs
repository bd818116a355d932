//! Primitive modes and CPU-side primitive assembly.

use super::index::RESTART_INDEX;

/// How an index sequence is assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveMode {
    /// Each index is a point.
    Points,
    /// Every two indices form a line.
    Lines,
    /// Consecutive indices form connected lines.
    LineStrip,
    /// A line strip closed back to its first index.
    LineLoop,
    /// Every three indices form a triangle.
    #[default]
    Triangles,
    /// Each index after the second forms a triangle with the previous two.
    TriangleStrip,
    /// Each index after the second forms a triangle with the first and the previous.
    TriangleFan,
}

/// One assembled primitive, as vertex indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// A single vertex.
    Point(u32),
    /// Two endpoints.
    Line([u32; 2]),
    /// Three corners, in winding order.
    Triangle([u32; 3]),
}

impl Primitive {
    /// Vertex indices of the primitive.
    pub fn vertices(&self) -> &[u32] {
        match self {
            Self::Point(v) => std::slice::from_ref(v),
            Self::Line(v) => v,
            Self::Triangle(v) => v,
        }
    }
}

impl PrimitiveMode {
    /// Indices per primitive for list modes, `None` for strips, loops and fans.
    pub fn vertices_per_primitive(&self) -> Option<usize> {
        match self {
            Self::Points => Some(1),
            Self::Lines => Some(2),
            Self::Triangles => Some(3),
            Self::LineStrip | Self::LineLoop | Self::TriangleStrip | Self::TriangleFan => None,
        }
    }

    /// Assemble `indices` into primitives.
    ///
    /// With `restart` enabled every [`RESTART_INDEX`] ends the current run
    /// and is not itself a vertex. Incomplete trailing primitives of a run
    /// are dropped. Strip triangles alternate winding so every triangle
    /// keeps the orientation of the first.
    pub fn assemble(&self, indices: &[u32], restart: bool) -> Vec<Primitive> {
        let mut primitives = Vec::new();
        if restart {
            for run in indices.split(|&i| i == RESTART_INDEX) {
                self.assemble_run(run, &mut primitives);
            }
        } else {
            self.assemble_run(indices, &mut primitives);
        }
        primitives
    }

    /// Number of primitives [`assemble`](Self::assemble) would produce.
    pub fn primitive_count(&self, indices: &[u32], restart: bool) -> usize {
        self.assemble(indices, restart).len()
    }

    fn assemble_run(&self, run: &[u32], out: &mut Vec<Primitive>) {
        match self {
            Self::Points => out.extend(run.iter().map(|&i| Primitive::Point(i))),
            Self::Lines => out.extend(run.chunks_exact(2).map(|c| Primitive::Line([c[0], c[1]]))),
            Self::LineStrip => out.extend(run.windows(2).map(|w| Primitive::Line([w[0], w[1]]))),
            Self::LineLoop => {
                out.extend(run.windows(2).map(|w| Primitive::Line([w[0], w[1]])));
                if let [first, .., last] = run {
                    out.push(Primitive::Line([*last, *first]));
                }
            }
            Self::Triangles => out.extend(
                run.chunks_exact(3)
                    .map(|c| Primitive::Triangle([c[0], c[1], c[2]])),
            ),
            Self::TriangleStrip => out.extend(run.windows(3).enumerate().map(|(i, w)| {
                if i % 2 == 0 {
                    Primitive::Triangle([w[0], w[1], w[2]])
                } else {
                    Primitive::Triangle([w[1], w[0], w[2]])
                }
            })),
            Self::TriangleFan => {
                if let [pivot, rest @ ..] = run {
                    out.extend(
                        rest.windows(2)
                            .map(|w| Primitive::Triangle([*pivot, w[0], w[1]])),
                    );
                }
            }
        }
    }
}
