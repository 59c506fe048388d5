//! An owned ffmpeg filter graph with linearly used pads.
//!
//! Every filter output is a [`Pad`] that is not `Clone`: feeding it into the
//! next filter moves it, so a link can never be consumed twice and every link
//! that is no longer wanted has to be handed to [`FilterGraph::discard`].

use std::path::{Path, PathBuf};

use crate::stream::filters::{self, MediaKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Stream of an input file
    Input(usize),
    /// Output of a filter node
    Link(usize),
}

/// One unconsumed output of an input file or filter node
#[derive(Debug, PartialEq, Eq)]
pub struct Pad {
    kind: MediaKind,
    slot: Slot,
}

impl Pad {
    pub fn kind(&self) -> MediaKind {
        self.kind
    }
}

fn label(kind: MediaKind, slot: Slot) -> String {
    match slot {
        Slot::Input(index) => format!("[{}:{}]", index, kind.specifier()),
        Slot::Link(index) => format!("[{}{}]", kind.specifier(), index),
    }
}

fn map_target(pad: &Pad) -> String {
    match pad.slot {
        Slot::Input(index) => format!("{}:{}", index, pad.kind.specifier()),
        Slot::Link(_) => label(pad.kind, pad.slot),
    }
}

/// How far the inputs and links of an absorbed graph were moved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Offsets {
    inputs: usize,
    links: usize,
}

impl Offsets {
    fn slot(&self, slot: Slot) -> Slot {
        match slot {
            Slot::Input(index) => Slot::Input(index + self.inputs),
            Slot::Link(index) => Slot::Link(index + self.links),
        }
    }

    /// Re-home a pad of the absorbed graph
    pub fn shift(&self, pad: Pad) -> Pad {
        Pad {
            kind: pad.kind,
            slot: self.slot(pad.slot),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct GraphInput {
    options: Vec<String>,
    path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    inputs: Vec<(MediaKind, Slot)>,
    filter: String,
    outputs: Vec<(MediaKind, usize)>,
}

impl Node {
    fn render(&self) -> String {
        let mut text = String::new();
        for (kind, slot) in &self.inputs {
            text.push_str(&label(*kind, *slot));
        }
        text.push_str(&self.filter);
        for (kind, link) in &self.outputs {
            text.push_str(&label(*kind, Slot::Link(*link)));
        }
        text
    }
}

/// Inputs plus filter nodes, compiled into a single ffmpeg invocation
#[derive(Debug, Default, PartialEq)]
pub struct FilterGraph {
    inputs: Vec<GraphInput>,
    nodes: Vec<Node>,
    links: usize,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an input file; `options` go in front of its `-i`
    pub fn add_input(&mut self, path: &Path, options: Vec<String>) -> usize {
        self.inputs.push(GraphInput {
            options,
            path: path.to_path_buf(),
        });
        self.inputs.len() - 1
    }

    /// The `kind` stream of input `index`
    pub fn input_pad(&self, index: usize, kind: MediaKind) -> Pad {
        Pad {
            kind,
            slot: Slot::Input(index),
        }
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn next_link(&mut self) -> usize {
        let link = self.links;
        self.links += 1;
        link
    }

    fn push(&mut self, inputs: Vec<Pad>, filter: String, kind: MediaKind) -> Pad {
        let link = self.next_link();
        self.nodes.push(Node {
            inputs: inputs.into_iter().map(|pad| (pad.kind, pad.slot)).collect(),
            filter,
            outputs: vec![(kind, link)],
        });
        Pad {
            kind,
            slot: Slot::Link(link),
        }
    }

    /// Run `pad` through a single-input, single-output filter chain
    pub fn chain(&mut self, pad: Pad, filter: impl Into<String>) -> Pad {
        let kind = pad.kind;
        self.push(vec![pad], filter.into(), kind)
    }

    /// A generator without inputs (`color`, `anullsrc`, `sine`)
    pub fn source(&mut self, kind: MediaKind, filter: impl Into<String>) -> Pad {
        self.push(Vec::new(), filter.into(), kind)
    }

    /// Feed several pads into one filter with a single `kind` output
    pub fn join(&mut self, kind: MediaKind, pads: Vec<Pad>, filter: impl Into<String>) -> Pad {
        self.push(pads, filter.into(), kind)
    }

    /// Duplicate a pad
    pub fn split(&mut self, pad: Pad) -> (Pad, Pad) {
        let kind = pad.kind;
        let first = self.next_link();
        let second = self.next_link();
        self.nodes.push(Node {
            inputs: vec![(kind, pad.slot)],
            filter: filters::split(kind, 2),
            outputs: vec![(kind, first), (kind, second)],
        });
        (
            Pad { kind, slot: Slot::Link(first) },
            Pad { kind, slot: Slot::Link(second) },
        )
    }

    /// Terminate a pad nobody consumes
    ///
    /// Unused input streams are simply left alone; filter outputs are sunk.
    pub fn discard(&mut self, pad: Pad) {
        if let Slot::Link(_) = pad.slot {
            self.nodes.push(Node {
                inputs: vec![(pad.kind, pad.slot)],
                filter: filters::null_sink(pad.kind).to_string(),
                outputs: Vec::new(),
            });
        }
    }

    /// Move all inputs and nodes of `other` into this graph
    ///
    /// Pads that belonged to `other` must be passed through the returned
    /// [`Offsets`] before use.
    pub fn absorb(&mut self, other: FilterGraph) -> Offsets {
        let offsets = Offsets {
            inputs: self.inputs.len(),
            links: self.links,
        };

        self.inputs.extend(other.inputs);
        for node in other.nodes {
            self.nodes.push(Node {
                inputs: node
                    .inputs
                    .into_iter()
                    .map(|(kind, slot)| (kind, offsets.slot(slot)))
                    .collect(),
                filter: node.filter,
                outputs: node
                    .outputs
                    .into_iter()
                    .map(|(kind, link)| (kind, link + offsets.links))
                    .collect(),
            });
        }
        self.links += other.links;
        offsets
    }

    /// The `-filter_complex` description
    pub fn filter_complex(&self) -> String {
        self.nodes.iter().map(Node::render).collect::<Vec<_>>().join(";")
    }

    /// Input, filter and mapping arguments that produce `outputs`
    ///
    /// Output encoding options and the output file follow these.
    pub fn compile(&self, outputs: &[&Pad]) -> Vec<String> {
        let mut args = Vec::new();
        for input in &self.inputs {
            args.extend(input.options.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.display().to_string());
        }
        if !self.nodes.is_empty() {
            args.push("-filter_complex".to_string());
            args.push(self.filter_complex());
        }
        for pad in outputs {
            args.push("-map".to_string());
            args.push(map_target(pad));
        }
        args
    }
}
