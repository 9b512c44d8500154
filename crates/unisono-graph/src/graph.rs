//! The patch graph: modules, cables, and the block scheduler.

use crate::error::{GraphError, Result};
use crate::module::{Module, ModuleId, ModuleKind, ProcessEnv};
use crate::modules::{AdsrModule, NoteInModule, OutputModule, VcaModule, VcfModule, VcoModule};
use crate::port::PortRef;
use parking_lot::Mutex;
use unisono_core::{note_to_hz, AudioContext, ParamSpec, SoundGenerator};

/// Stable handle to a cable.
pub type CableId = u64;

/// A connection from an output port to an input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cable {
    pub id: CableId,
    pub source: PortRef,
    pub dest: PortRef,
}

/// Most ports any built-in module exposes; input resolution uses a
/// fixed-size scratch so the render path stays allocation-free.
const MAX_PORTS: usize = 8;

const PARAMS: &[ParamSpec] = &[ParamSpec::new("gain", 0.8, 0.0, 1.0)];

struct Slot {
    id: ModuleId,
    name: String,
    module: Box<dyn Module>,
}

struct Core {
    context: AudioContext,
    slots: Vec<Slot>,
    /// Output-port buffers, parallel to `slots`.
    buffers: Vec<Vec<Vec<f32>>>,
    cables: Vec<Cable>,
    next_module_id: ModuleId,
    next_cable_id: CableId,
    order: Vec<usize>,
    order_dirty: bool,
    zero: Vec<f32>,
    current_note: Option<u8>,
    gain: f32,
}

impl Core {
    fn slot_index(&self, id: ModuleId) -> Result<usize> {
        self.slots
            .iter()
            .position(|s| s.id == id)
            .ok_or(GraphError::NoSuchModule(id))
    }

    fn add_module(&mut self, name: &str, module: Box<dyn Module>) -> ModuleId {
        let id = self.next_module_id;
        self.next_module_id += 1;
        let outputs = module.outputs().len();
        self.slots.push(Slot {
            id,
            name: name.to_string(),
            module,
        });
        self.buffers.push(vec![Vec::new(); outputs]);
        self.order_dirty = true;
        log::debug!("graph: added module '{name}' (id {id})");
        id
    }

    fn remove_module(&mut self, id: ModuleId) -> Result<()> {
        let index = self.slot_index(id)?;
        self.cables
            .retain(|c| c.source.module != id && c.dest.module != id);
        self.slots.remove(index);
        self.buffers.remove(index);
        self.order_dirty = true;
        Ok(())
    }

    fn connect(
        &mut self,
        source: ModuleId,
        source_port: &str,
        dest: ModuleId,
        dest_port: &str,
    ) -> Result<CableId> {
        let source_index = self.slot_index(source)?;
        let dest_index = self.slot_index(dest)?;

        let source_module = &self.slots[source_index].module;
        let out_index = match source_module
            .outputs()
            .iter()
            .position(|p| p.name == source_port)
        {
            Some(i) => i,
            None if source_module.inputs().iter().any(|p| p.name == source_port) => {
                return Err(GraphError::DirectionMismatch {
                    module: source,
                    port: source_port.to_string(),
                })
            }
            None => {
                return Err(GraphError::NoSuchPort {
                    module: source,
                    port: source_port.to_string(),
                })
            }
        };
        let dest_module = &self.slots[dest_index].module;
        let in_index = match dest_module.inputs().iter().position(|p| p.name == dest_port) {
            Some(i) => i,
            None if dest_module.outputs().iter().any(|p| p.name == dest_port) => {
                return Err(GraphError::DirectionMismatch {
                    module: dest,
                    port: dest_port.to_string(),
                })
            }
            None => {
                return Err(GraphError::NoSuchPort {
                    module: dest,
                    port: dest_port.to_string(),
                })
            }
        };

        let from_kind = source_module.outputs()[out_index].kind;
        let to_kind = dest_module.inputs()[in_index].kind;
        if !from_kind.connects_to(to_kind) {
            return Err(GraphError::KindMismatch {
                from: from_kind,
                to: to_kind,
            });
        }

        // An input accepts one cable: replace any existing one.
        let dest_ref = PortRef {
            module: dest,
            port: in_index,
        };
        self.cables.retain(|c| c.dest != dest_ref);

        let id = self.next_cable_id;
        self.next_cable_id += 1;
        self.cables.push(Cable {
            id,
            source: PortRef {
                module: source,
                port: out_index,
            },
            dest: dest_ref,
        });
        self.order_dirty = true;
        Ok(id)
    }

    fn disconnect(&mut self, cable: CableId) -> Result<()> {
        let index = self
            .cables
            .iter()
            .position(|c| c.id == cable)
            .ok_or(GraphError::NoSuchCable(cable))?;
        self.cables.remove(index);
        self.order_dirty = true;
        Ok(())
    }

    /// The cable feeding an input port, if any.
    fn cable_into(&self, module: ModuleId, port: usize) -> Option<&Cable> {
        self.cables
            .iter()
            .find(|c| c.dest.module == module && c.dest.port == port)
    }

    /// Depth-first topological rebuild. A back edge onto a module still
    /// being visited is skipped: the cycle survives as a one-block
    /// feedback delay through that module's previous output buffer.
    fn rebuild_order(&mut self) {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            Visiting,
            Done,
        }

        fn visit(
            index: usize,
            slots: &[Slot],
            cables: &[Cable],
            marks: &mut [Mark],
            order: &mut Vec<usize>,
        ) {
            match marks[index] {
                Mark::Done | Mark::Visiting => return,
                Mark::Unvisited => {}
            }
            marks[index] = Mark::Visiting;
            let id = slots[index].id;
            for port in 0..slots[index].module.inputs().len() {
                let producer = cables
                    .iter()
                    .find(|c| c.dest.module == id && c.dest.port == port)
                    .and_then(|c| slots.iter().position(|s| s.id == c.source.module));
                if let Some(producer) = producer {
                    visit(producer, slots, cables, marks, order);
                }
            }
            marks[index] = Mark::Done;
            order.push(index);
        }

        let mut marks = vec![Mark::Unvisited; self.slots.len()];
        let mut order = Vec::with_capacity(self.slots.len());
        for index in 0..self.slots.len() {
            visit(index, &self.slots, &self.cables, &mut marks, &mut order);
        }
        self.order = order;
        self.order_dirty = false;
        log::debug!("graph: rebuilt order over {} modules", self.slots.len());
    }

    fn ensure_buffers(&mut self, block: usize) {
        if block > self.zero.len() {
            self.zero = vec![0.0; block];
        }
        for (slot, buffers) in self.slots.iter().zip(self.buffers.iter_mut()) {
            let wanted = slot.module.outputs().len();
            if buffers.len() != wanted {
                buffers.resize(wanted, Vec::new());
            }
            for buffer in buffers.iter_mut() {
                if buffer.len() < block {
                    buffer.resize(block, 0.0);
                }
            }
        }
    }

    fn render(&mut self, region: &mut [f32]) {
        let channels = self.context.channels;
        let block = region.len() / channels;
        if block == 0 {
            return;
        }
        if self.order_dirty {
            self.rebuild_order();
        }
        self.ensure_buffers(block);
        let env = ProcessEnv {
            context: self.context,
            block_size: block,
        };

        for position in 0..self.order.len() {
            let index = self.order[position];
            if index >= self.slots.len() {
                continue;
            }
            let id = self.slots[index].id;
            let input_count = self.slots[index].module.inputs().len().min(MAX_PORTS);

            // Take the module's own buffers out so upstream reads can
            // borrow the rest; a self-feedback edge reads zeros.
            let mut outs = std::mem::take(&mut self.buffers[index]);

            let mut inputs: [&[f32]; MAX_PORTS] = [&[]; MAX_PORTS];
            for port in 0..input_count {
                let source = self.cable_into(id, port).map(|c| c.source);
                inputs[port] = match source {
                    Some(source) => {
                        let producer = self.slots.iter().position(|s| s.id == source.module);
                        match producer {
                            Some(p) if !self.buffers[p].is_empty() => self.buffers[p]
                                .get(source.port)
                                .map(|b| &b[..block])
                                .unwrap_or(&self.zero[..block]),
                            _ => &self.zero[..block],
                        }
                    }
                    None => &self.zero[..block],
                };
            }

            self.slots[index]
                .module
                .process(&inputs[..input_count], &mut outs, &env);
            self.buffers[index] = outs;
        }

        // Interleave the output module's inputs into the caller's buffer.
        let Some(output_index) = self
            .slots
            .iter()
            .position(|s| s.module.kind() == ModuleKind::Output)
        else {
            return;
        };
        let output_id = self.slots[output_index].id;
        let left = self.resolve_input(output_id, 0, block);
        let right = self
            .cable_into(output_id, 1)
            .is_some()
            .then(|| self.resolve_input(output_id, 1, block))
            .unwrap_or(left);

        for i in 0..block {
            let frame = &mut region[i * channels..(i + 1) * channels];
            if channels == 2 {
                frame[0] += left[i] * self.gain;
                frame[1] += right[i] * self.gain;
            } else {
                frame[0] += (left[i] + right[i]) * 0.5 * self.gain;
            }
        }
    }

    fn resolve_input(&self, module: ModuleId, port: usize, block: usize) -> &[f32] {
        self.cable_into(module, port)
            .and_then(|c| {
                let producer = self.slots.iter().position(|s| s.id == c.source.module)?;
                self.buffers[producer].get(c.source.port)
            })
            .map(|b| &b[..block])
            .unwrap_or(&self.zero[..block])
    }

    fn set_note(&mut self, frequency: f64, velocity: f32, gate: bool) {
        for slot in self.slots.iter_mut() {
            if slot.module.kind() == ModuleKind::NoteIn {
                if gate {
                    slot.module.set_param("frequency", frequency as f32);
                    slot.module.set_param("velocity", velocity);
                }
                slot.module.set_param("gate", if gate { 1.0 } else { 0.0 });
            }
        }
    }
}

/// A modular patch that renders as a [`SoundGenerator`].
///
/// Edits and rendering share the graph's single mutex; an edit made
/// while a block renders takes effect at the next block boundary.
pub struct PatchGraph {
    core: Mutex<Core>,
}

impl PatchGraph {
    pub fn new(context: AudioContext) -> Self {
        Self {
            core: Mutex::new(Core {
                context,
                slots: Vec::new(),
                buffers: Vec::new(),
                cables: Vec::new(),
                next_module_id: 1,
                next_cable_id: 1,
                order: Vec::new(),
                order_dirty: true,
                zero: vec![0.0; context.buffer_size],
                current_note: None,
                gain: 0.8,
            }),
        }
    }

    /// The classic subtractive rack: VCO -> VCF -> VCA -> Output with an
    /// ADSR on the VCA's CV input, all driven by a note-input module.
    pub fn default_patch(context: AudioContext) -> Self {
        let graph = Self::new(context);
        let note = graph.add_module("note", Box::new(NoteInModule::new()));
        let vco = graph.add_module("vco", Box::new(VcoModule::new()));
        let vcf = graph.add_module("vcf", Box::new(VcfModule::new()));
        let vca = graph.add_module("vca", Box::new(VcaModule::new()));
        let adsr = graph.add_module("adsr", Box::new(AdsrModule::new()));
        let output = graph.add_module("output", Box::new(OutputModule::new()));

        // The default wiring cannot fail; the expects document that.
        graph.connect(note, "pitch", vco, "pitch").expect("wire pitch");
        graph.connect(note, "gate", adsr, "gate").expect("wire gate");
        graph.connect(vco, "out", vcf, "in").expect("wire vco");
        graph.connect(vcf, "out", vca, "in").expect("wire vcf");
        graph.connect(adsr, "env", vca, "cv").expect("wire env");
        graph.connect(vca, "out", output, "left").expect("wire left");
        graph.connect(vca, "out", output, "right").expect("wire right");
        graph
    }

    pub fn add_module(&self, name: &str, module: Box<dyn Module>) -> ModuleId {
        self.core.lock().add_module(name, module)
    }

    pub fn remove_module(&self, id: ModuleId) -> Result<()> {
        self.core.lock().remove_module(id)
    }

    pub fn connect(
        &self,
        source: ModuleId,
        source_port: &str,
        dest: ModuleId,
        dest_port: &str,
    ) -> Result<CableId> {
        self.core.lock().connect(source, source_port, dest, dest_port)
    }

    pub fn disconnect(&self, cable: CableId) -> Result<()> {
        self.core.lock().disconnect(cable)
    }

    pub fn cables(&self) -> Vec<Cable> {
        self.core.lock().cables.clone()
    }

    /// Module ids in the current processing order (rebuilding if needed).
    pub fn processing_order(&self) -> Vec<ModuleId> {
        let mut core = self.core.lock();
        if core.order_dirty {
            core.rebuild_order();
        }
        core.order
            .iter()
            .map(|&index| core.slots[index].id)
            .collect()
    }

    /// Set a parameter on a named module.
    pub fn set_module_param(&self, module_name: &str, param: &str, value: f32) {
        let mut core = self.core.lock();
        for slot in core.slots.iter_mut() {
            if slot.name == module_name {
                slot.module.set_param(param, value);
                return;
            }
        }
    }
}

impl SoundGenerator for PatchGraph {
    fn note_on(&self, note: u8, velocity: u8) {
        if note > 127 {
            return;
        }
        if velocity == 0 {
            self.note_off(note);
            return;
        }
        let mut core = self.core.lock();
        core.current_note = Some(note);
        core.set_note(note_to_hz(note), velocity as f32 / 127.0, true);
    }

    fn note_off(&self, note: u8) {
        let mut core = self.core.lock();
        if core.current_note == Some(note) {
            core.current_note = None;
            core.set_note(0.0, 0.0, false);
        }
    }

    fn all_notes_off(&self) {
        let mut core = self.core.lock();
        core.current_note = None;
        core.set_note(0.0, 0.0, false);
    }

    /// Graph-level parameters, plus dotted `module.param` addressing for
    /// everything inside the rack.
    fn set_parameter(&self, name: &str, value: f32) {
        if name.eq_ignore_ascii_case("gain") {
            self.core.lock().gain = PARAMS[0].clamp(value);
            return;
        }
        if let Some((module_name, param)) = name.split_once('.') {
            self.set_module_param(module_name, param, value);
        }
    }

    fn parameters(&self) -> &[ParamSpec] {
        PARAMS
    }

    fn render(&self, buffer: &mut [f32], offset: usize, count: usize) -> usize {
        let start = offset.min(buffer.len());
        let end = (start + count).min(buffer.len());
        let region = &mut buffer[start..end];
        region.fill(0.0);
        if region.is_empty() {
            return 0;
        }
        let written = region.len();
        self.core.lock().render(region);
        written
    }
}
