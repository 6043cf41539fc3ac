//! Evolutionary mechanics: gamete construction and scripted-callback
//! mediation.

pub mod callbacks;
pub mod crossover;

pub use callbacks::{
    apply_fitness_callbacks, apply_mate_choice_callbacks, apply_modify_child_callbacks,
    blocks_matching, BlockQuery, CallbackKind, GenomeBank, GenomeView, Interpreter,
    MateChoiceOutcome, MateChoiceSource, ModifyChildContext, NullInterpreter, ObjectValue,
    ScriptBlock, SymbolBinding, Value,
};
pub use crossover::crossover_mutation;
