//! Scripted callback mediation.
//!
//! The population core never interprets script itself; it binds a fixed set
//! of symbolic names, hands a callback block to an external [`Interpreter`],
//! and validates whatever comes back. Three callback families exist:
//!
//! * **mateChoice()** — may accept, reweight, or reject a proposed first
//!   parent while a mating is being set up;
//! * **modifyChild()** — inspects a fully constructed child and accepts or
//!   rejects it;
//! * **fitness()** — rewrites the fitness contribution of one mutation
//!   while the cached fitness tables are refreshed.
//!
//! Every invocation receives a freshly built symbol list, so values bound
//! for one callback are never visible to the next.

use crate::base::{sampling, Generation, MutationId, SubpopId};
use crate::errors::{CallbackError, SimulationError};
use rand::Rng;

/// The kind of a script block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    /// A plain event, executed for its side effects at its generation
    Event,
    /// A mateChoice() callback
    MateChoice,
    /// A modifyChild() callback
    ModifyChild,
    /// A fitness() callback, optionally scoped to one mutation type id
    Fitness(Option<i32>),
}

/// A user-supplied script block, opaque to the core.
#[derive(Debug, Clone)]
pub struct ScriptBlock {
    /// Optional user-visible id
    pub id: Option<i32>,
    /// What the block is
    pub kind: CallbackKind,
    /// First generation the block is due, inclusive
    pub start_generation: Generation,
    /// Last generation the block is due, inclusive
    pub end_generation: Generation,
    /// Subpopulation scope; `None` applies to every subpopulation
    pub subpop: Option<SubpopId>,
    /// Whether the block is currently active
    pub active: bool,
    /// The compound statement handed to the interpreter
    pub source: String,
}

impl ScriptBlock {
    /// A block of the given kind, active in every generation and scope.
    pub fn new(kind: CallbackKind, source: impl Into<String>) -> Self {
        Self {
            id: None,
            kind,
            start_generation: Generation::MIN,
            end_generation: Generation::MAX,
            subpop: None,
            active: true,
            source: source.into(),
        }
    }

    /// Restrict the block to a generation range.
    pub fn for_generations(mut self, start: Generation, end: Generation) -> Self {
        self.start_generation = start;
        self.end_generation = end;
        self
    }

    /// Restrict the block to one subpopulation.
    pub fn for_subpop(mut self, subpop: SubpopId) -> Self {
        self.subpop = Some(subpop);
        self
    }

    /// `true` if this block is due in the given generation.
    #[inline]
    pub fn matches_generation(&self, generation: Generation) -> bool {
        generation >= self.start_generation && generation <= self.end_generation
    }

    /// `true` if this block applies to the given target subpopulation.
    #[inline]
    pub fn matches_subpop(&self, subpop: SubpopId) -> bool {
        self.subpop.is_none() || self.subpop == Some(subpop)
    }
}

/// Query key for [`blocks_matching`]; `Fitness` matches any fitness scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockQuery {
    Event,
    MateChoice,
    ModifyChild,
    Fitness,
}

/// Collect the active blocks of one kind due in `generation`, optionally
/// restricted to one target subpopulation.
pub fn blocks_matching<'a>(
    blocks: &'a [ScriptBlock],
    generation: Generation,
    query: BlockQuery,
    subpop: Option<SubpopId>,
) -> Vec<&'a ScriptBlock> {
    blocks
        .iter()
        .filter(|block| {
            let kind_matches = matches!(
                (block.kind, query),
                (CallbackKind::Event, BlockQuery::Event)
                    | (CallbackKind::MateChoice, BlockQuery::MateChoice)
                    | (CallbackKind::ModifyChild, BlockQuery::ModifyChild)
                    | (CallbackKind::Fitness(_), BlockQuery::Fitness)
            );
            kind_matches
                && block.matches_generation(generation)
                && subpop.is_none_or(|id| block.matches_subpop(id))
        })
        .collect()
}

/// Which genome bank a view points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenomeBank {
    Parent,
    Child,
}

/// Read-only handle to one genome, safe to hand to external script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenomeView {
    pub subpop: SubpopId,
    pub bank: GenomeBank,
    pub genome_index: usize,
}

/// An object handle exposed to script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectValue {
    Genome(GenomeView),
    Subpopulation(SubpopId),
    Mutation(MutationId),
}

/// A value crossing the interpreter boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Null,
    Logical(Vec<bool>),
    Integer(Vec<i64>),
    Float(Vec<f64>),
    Object(Vec<ObjectValue>),
}

impl Value {
    /// The single boolean, if this is a logical singleton.
    pub fn logical_singleton(&self) -> Option<bool> {
        match self {
            Self::Logical(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }

    /// The single float, if this is a float singleton.
    pub fn float_singleton(&self) -> Option<f64> {
        match self {
            Self::Float(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }
}

/// One symbol binding passed into a callback invocation.
pub type SymbolBinding = (&'static str, Value);

/// The external interpreter contract.
///
/// The mediator binds symbols before each call; the interpreter evaluates
/// the block's compound statement and returns its value. Interpreter errors
/// are fatal to the simulation.
pub trait Interpreter {
    fn evaluate(
        &mut self,
        block: &ScriptBlock,
        symbols: &[SymbolBinding],
    ) -> Result<Value, CallbackError>;
}

/// An interpreter for runs without scripted callbacks; evaluating anything
/// through it is an error.
#[derive(Debug, Default)]
pub struct NullInterpreter;

impl Interpreter for NullInterpreter {
    fn evaluate(
        &mut self,
        _block: &ScriptBlock,
        _symbols: &[SymbolBinding],
    ) -> Result<Value, CallbackError> {
        Err(CallbackError::Interpreter(
            "no interpreter is attached to this simulation".into(),
        ))
    }
}

/// What the mate-choice chain decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MateChoiceOutcome {
    /// Use this index as the second parent
    Parent(usize),
    /// No acceptable mate exists; redraw the first parent
    Redraw,
}

/// The weight table a mate-choice chain starts from: the source
/// subpopulation's cached fitness of the relevant sex.
#[derive(Debug, Clone, Copy)]
pub struct MateChoiceSource<'a> {
    pub subpop_id: SubpopId,
    pub parent_count: usize,
    pub weights: &'a [f64],
    pub weights_total: f64,
}

/// Run the mateChoice() chain for a chosen first parent.
///
/// The weight vector starts as the source's cached fitness and is copied
/// only on the first modification. After the chain completes, a modified
/// vector is validated (finite, non-negative, positive sum) and sampled;
/// an unmodified vector falls through to the standard fitness draw.
pub fn apply_mate_choice_callbacks<R: Rng + ?Sized>(
    parent1_index: usize,
    target_subpop: SubpopId,
    source: &MateChoiceSource<'_>,
    callbacks: &[&ScriptBlock],
    interpreter: &mut dyn Interpreter,
    rng: &mut R,
) -> Result<MateChoiceOutcome, SimulationError> {
    let mut modified_weights: Option<Vec<f64>> = None;

    for callback in callbacks {
        if !callback.active {
            continue;
        }

        let current: &[f64] = modified_weights.as_deref().unwrap_or(source.weights);
        let symbols: Vec<SymbolBinding> = vec![
            (
                "genome1",
                Value::Object(vec![ObjectValue::Genome(GenomeView {
                    subpop: source.subpop_id,
                    bank: GenomeBank::Parent,
                    genome_index: parent1_index * 2,
                })]),
            ),
            (
                "genome2",
                Value::Object(vec![ObjectValue::Genome(GenomeView {
                    subpop: source.subpop_id,
                    bank: GenomeBank::Parent,
                    genome_index: parent1_index * 2 + 1,
                })]),
            ),
            (
                "subpop",
                Value::Object(vec![ObjectValue::Subpopulation(target_subpop)]),
            ),
            (
                "sourceSubpop",
                Value::Object(vec![ObjectValue::Subpopulation(source.subpop_id)]),
            ),
            ("weights", Value::Float(current.to_vec())),
        ];

        match interpreter.evaluate(callback, &symbols)? {
            Value::Null => {
                // the callback did not wish to alter the weights
            }
            Value::Float(returned) => {
                if returned.is_empty() {
                    // no acceptable mate for this first parent
                    return Ok(MateChoiceOutcome::Redraw);
                }
                if returned.len() != source.parent_count {
                    return Err(CallbackError::MateChoiceLength {
                        expected: source.parent_count,
                        actual: returned.len(),
                    }
                    .into());
                }
                modified_weights = Some(returned);
            }
            _ => return Err(CallbackError::MateChoiceReturnType.into()),
        }
    }

    let Some(weights) = modified_weights else {
        // no callback changed anything: the standard fitness draw
        return Ok(MateChoiceOutcome::Parent(sampling::weighted_index(
            source.weights,
            source.weights_total,
            rng,
        )));
    };

    let mut weights_sum = 0.0;
    let mut positive_count = 0usize;
    for &w in &weights {
        if !w.is_finite() {
            return Err(CallbackError::NonFiniteWeight(w).into());
        }
        if w < 0.0 {
            return Err(CallbackError::NegativeWeight(w).into());
        }
        if w > 0.0 {
            positive_count += 1;
        }
        weights_sum += w;
    }
    if weights_sum <= 0.0 {
        return Err(CallbackError::NonPositiveWeightSum(weights_sum).into());
    }

    if positive_count == 1 {
        // the chain has chosen a parent; locate it without a draw to avoid
        // floating error
        let index = weights
            .iter()
            .position(|&w| w > 0.0)
            .expect("one positive weight exists");
        return Ok(MateChoiceOutcome::Parent(index));
    }

    let target = rng.random::<f64>() * weights_sum;
    let mut cumulative = 0.0;
    for (index, &w) in weights.iter().enumerate() {
        cumulative += w;
        if target <= cumulative {
            return Ok(MateChoiceOutcome::Parent(index));
        }
    }
    // roundoff goes to the last candidate
    Ok(MateChoiceOutcome::Parent(weights.len() - 1))
}

/// Everything a modifyChild() invocation is told about the proposed child.
#[derive(Debug, Clone, Copy)]
pub struct ModifyChildContext {
    pub child_index: usize,
    /// `None` in models without sexes
    pub child_is_female: Option<bool>,
    pub parent1_index: usize,
    pub parent2_index: usize,
    pub is_selfing: bool,
    pub subpop: SubpopId,
    pub source_subpop: SubpopId,
}

/// Run the modifyChild() chain for a generated child.
///
/// Each callback must return a logical singleton; `false` short-circuits the
/// chain and tells the scheduler to discard the child.
pub fn apply_modify_child_callbacks(
    context: &ModifyChildContext,
    callbacks: &[&ScriptBlock],
    interpreter: &mut dyn Interpreter,
) -> Result<bool, SimulationError> {
    for callback in callbacks {
        if !callback.active {
            continue;
        }

        let child_genome = |offset: usize| {
            Value::Object(vec![ObjectValue::Genome(GenomeView {
                subpop: context.subpop,
                bank: GenomeBank::Child,
                genome_index: context.child_index * 2 + offset,
            })])
        };
        let parent_genome = |parent: usize, offset: usize| {
            Value::Object(vec![ObjectValue::Genome(GenomeView {
                subpop: context.source_subpop,
                bank: GenomeBank::Parent,
                genome_index: parent * 2 + offset,
            })])
        };

        let symbols: Vec<SymbolBinding> = vec![
            ("childGenome1", child_genome(0)),
            ("childGenome2", child_genome(1)),
            (
                "childIsFemale",
                match context.child_is_female {
                    Some(female) => Value::Logical(vec![female]),
                    None => Value::Null,
                },
            ),
            ("parent1Genome1", parent_genome(context.parent1_index, 0)),
            ("parent1Genome2", parent_genome(context.parent1_index, 1)),
            ("parent2Genome1", parent_genome(context.parent2_index, 0)),
            ("parent2Genome2", parent_genome(context.parent2_index, 1)),
            ("isSelfing", Value::Logical(vec![context.is_selfing])),
            (
                "subpop",
                Value::Object(vec![ObjectValue::Subpopulation(context.subpop)]),
            ),
            (
                "sourceSubpop",
                Value::Object(vec![ObjectValue::Subpopulation(context.source_subpop)]),
            ),
        ];

        let result = interpreter.evaluate(callback, &symbols)?;
        let Some(keep) = result.logical_singleton() else {
            return Err(CallbackError::ModifyChildReturnType.into());
        };

        if !keep {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Run the fitness() chain for one mutation's fitness contribution.
///
/// `rel_fitness` is the default contribution computed from the selection and
/// dominance coefficients; `homozygous` is `None` for a hemizygous carrier.
/// Returns the (possibly rewritten) contribution.
pub fn apply_fitness_callbacks(
    mutation: MutationId,
    mutation_type_id: i32,
    mut rel_fitness: f64,
    homozygous: Option<bool>,
    subpop: SubpopId,
    callbacks: &[&ScriptBlock],
    interpreter: &mut dyn Interpreter,
) -> Result<f64, SimulationError> {
    for callback in callbacks {
        if !callback.active {
            continue;
        }
        if let CallbackKind::Fitness(Some(scope)) = callback.kind {
            if scope != mutation_type_id {
                continue;
            }
        }

        let symbols: Vec<SymbolBinding> = vec![
            ("mut", Value::Object(vec![ObjectValue::Mutation(mutation)])),
            ("relFitness", Value::Float(vec![rel_fitness])),
            (
                "homozygous",
                match homozygous {
                    Some(h) => Value::Logical(vec![h]),
                    None => Value::Null,
                },
            ),
            (
                "subpop",
                Value::Object(vec![ObjectValue::Subpopulation(subpop)]),
            ),
        ];

        let result = interpreter.evaluate(callback, &symbols)?;
        let Some(updated) = result.float_singleton() else {
            return Err(CallbackError::FitnessReturnType.into());
        };
        rel_fitness = updated;
    }

    Ok(rel_fitness)
}
