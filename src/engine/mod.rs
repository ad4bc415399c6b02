// Iterative construction engine for the four-layer DAG
//
// The orchestrator runs optimization rounds over the shared model, the
// evaluator scores convergence, and the strategy folds external feedback
// into the next round's priorities.

pub mod evaluator;
pub mod iterator;
pub mod optimizer;
pub mod types;

pub use evaluator::ConvergenceEvaluator;
pub use iterator::{layer_score, FeedbackHandler, FourLayerIterator, ProgressHandler};
pub use optimizer::LayerOptimizer;
pub use types::{
    FeedbackDecision, FeedbackRequest, InitialRequirements, IterationConfig, IterationMetrics,
    IterationPhase, IterationStrategy, IteratorStatus, LayerSummary, OptimizationFocus,
    OptimizationResult, ProgressUpdate, StrategyPatch, VisualizationExport,
};
