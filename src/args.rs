use clap::Parser;

use std::path::PathBuf;

use crate::common::{Algorithm, HeuristicChoice};

#[derive(Parser)]
#[clap(name="aobb", version, author, about)]
pub struct Args {
    /// The input network, in UAI format
    #[clap(short, long, value_parser)]
    input: PathBuf,
    /// Evidence file (count followed by variable/value pairs)
    #[clap(short, long)]
    evidence: Option<PathBuf>,
    /// Read the elimination ordering from this file
    #[clap(long)]
    ordering: Option<PathBuf>,
    /// Write the best assignment found to this file
    #[clap(long)]
    sol_file: Option<PathBuf>,
    /// Search strategy
    #[clap(short, long, value_enum, default_value_t=Algorithm::Bnb)]
    algorithm: Algorithm,
    /// Bounding heuristic
    #[clap(long, value_enum, default_value_t=HeuristicChoice::MiniBucket)]
    heuristic: HeuristicChoice,
    /// Mini-bucket scope bound
    #[clap(short='b', long, default_value_t=10)]
    i_bound: usize,
    /// Enable moment matching between the mini-buckets of a bucket
    #[clap(long="match", action)]
    moment_matching: bool,
    /// Maximum adaptive-cache context size; unlimited if absent
    #[clap(long)]
    cache_bound: Option<usize>,
    /// Disable context-based caching entirely
    #[clap(long, action)]
    nocaching: bool,
    /// Build an OR chain instead of a pseudo tree
    #[clap(long="or", action)]
    or_chain: bool,
    /// Rotate between the top-level subproblem stacks
    #[clap(long, action)]
    rotate: bool,
    /// Expansions on a stack before rotating to the next
    #[clap(long, default_value_t=1000)]
    rotate_limit: usize,
    /// Run limited discrepancy search with this budget for an initial bound
    #[clap(long)]
    lds: Option<usize>,
    /// Stops the search after this many seconds
    #[clap(short='t', long)]
    max_time: Option<u64>,
    /// Hard cap on the induced width
    #[clap(long)]
    max_width: Option<usize>,
    /// The memory limit, in mega-bytes
    #[clap(short, long)]
    memory: Option<u64>,
    /// FGLP iterations at the root
    #[clap(long, default_value_t=100)]
    mplp: usize,
    /// FGLP time budget at the root, in seconds
    #[clap(long, default_value_t=5.0)]
    mplps: f64,
    /// FGLP convergence tolerance at the root
    #[clap(long, default_value_t=1e-7)]
    mplpt: f64,
    /// FGLP iterations at every search node (0 disables)
    #[clap(long, default_value_t=0)]
    ndfglp: usize,
    /// FGLP time budget at every search node, in seconds
    #[clap(long, default_value_t=0.1)]
    ndfglps: f64,
    /// FGLP convergence tolerance at search nodes
    #[clap(long, default_value_t=1e-7)]
    ndfglpt: f64,
    /// Take labels from the reparameterized factors
    #[clap(long, action)]
    use_shifted_labels: bool,
    /// Collect the FGLP maxima into a nullary constant
    #[clap(long, action)]
    use_nullary_shift: bool,
    /// Priority-driven FGLP update schedule
    #[clap(long, action)]
    use_priority: bool,
    /// Randomized min-fill restarts
    #[clap(long, default_value_t=25)]
    order_iter: usize,
    /// Time budget for the ordering search, in seconds
    #[clap(long)]
    order_time: Option<u64>,
    /// Number of extra score ranks min-fill may pick from
    #[clap(long, default_value_t=0)]
    order_tolerance: usize,
    /// Seed for the randomized tie-breaking
    #[clap(long)]
    seed: Option<u64>,
    /// Collect stats during the search
    #[clap(long, action)]
    statistics: bool,
    /// Merge factors with identical scopes
    #[clap(long, action)]
    collapse: bool,
    /// Replace zero probabilities by this value
    #[clap(long, default_value_t=0.0)]
    perturb: f64,
    /// Seed the incumbent from this binary bound file
    #[clap(long)]
    initial_bound: Option<PathBuf>,
    /// Restrict the search to the subproblem described in this file
    #[clap(long)]
    subproblem: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            input: PathBuf::default(),
            evidence: None,
            ordering: None,
            sol_file: None,
            algorithm: Algorithm::Bnb,
            heuristic: HeuristicChoice::MiniBucket,
            i_bound: 10,
            moment_matching: false,
            cache_bound: None,
            nocaching: false,
            or_chain: false,
            rotate: false,
            rotate_limit: 1000,
            lds: None,
            max_time: None,
            max_width: None,
            memory: None,
            mplp: 100,
            mplps: 5.0,
            mplpt: 1e-7,
            ndfglp: 0,
            ndfglps: 0.1,
            ndfglpt: 1e-7,
            use_shifted_labels: false,
            use_nullary_shift: false,
            use_priority: false,
            order_iter: 25,
            order_time: None,
            order_tolerance: 0,
            seed: None,
            statistics: false,
            collapse: false,
            perturb: 0.0,
            initial_bound: None,
            subproblem: None,
        }
    }
}

impl Args {

    pub fn input(&self) -> &PathBuf {
        &self.input
    }

    pub fn evidence(&self) -> Option<&PathBuf> {
        self.evidence.as_ref()
    }

    pub fn ordering(&self) -> Option<&PathBuf> {
        self.ordering.as_ref()
    }

    pub fn sol_file(&self) -> Option<&PathBuf> {
        self.sol_file.as_ref()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn heuristic(&self) -> HeuristicChoice {
        self.heuristic
    }

    pub fn i_bound(&self) -> usize {
        self.i_bound
    }

    pub fn moment_matching(&self) -> bool {
        self.moment_matching
    }

    pub fn cache_bound(&self) -> Option<usize> {
        self.cache_bound
    }

    pub fn nocaching(&self) -> bool {
        self.nocaching
    }

    pub fn or_chain(&self) -> bool {
        self.or_chain
    }

    pub fn rotate(&self) -> bool {
        self.rotate
    }

    pub fn rotate_limit(&self) -> usize {
        self.rotate_limit
    }

    pub fn lds(&self) -> Option<usize> {
        self.lds
    }

    pub fn max_time(&self) -> Option<u64> {
        self.max_time
    }

    pub fn max_width(&self) -> Option<usize> {
        self.max_width
    }

    pub fn memory(&self) -> Option<u64> {
        self.memory
    }

    pub fn mplp(&self) -> usize {
        self.mplp
    }

    pub fn mplps(&self) -> f64 {
        self.mplps
    }

    pub fn mplpt(&self) -> f64 {
        self.mplpt
    }

    pub fn ndfglp(&self) -> usize {
        self.ndfglp
    }

    pub fn ndfglps(&self) -> f64 {
        self.ndfglps
    }

    pub fn ndfglpt(&self) -> f64 {
        self.ndfglpt
    }

    pub fn use_shifted_labels(&self) -> bool {
        self.use_shifted_labels
    }

    pub fn use_nullary_shift(&self) -> bool {
        self.use_nullary_shift
    }

    pub fn use_priority(&self) -> bool {
        self.use_priority
    }

    pub fn order_iter(&self) -> usize {
        self.order_iter
    }

    pub fn order_time(&self) -> Option<u64> {
        self.order_time
    }

    pub fn order_tolerance(&self) -> usize {
        self.order_tolerance
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn statistics(&self) -> bool {
        self.statistics
    }

    pub fn collapse(&self) -> bool {
        self.collapse
    }

    pub fn perturb(&self) -> f64 {
        self.perturb
    }

    pub fn initial_bound(&self) -> Option<&PathBuf> {
        self.initial_bound.as_ref()
    }

    pub fn subproblem(&self) -> Option<&PathBuf> {
        self.subproblem.as_ref()
    }

    pub fn set_input(&mut self, value: PathBuf) {
        self.input = value;
    }

    pub fn set_evidence(&mut self, value: Option<PathBuf>) {
        self.evidence = value;
    }

    pub fn set_ordering(&mut self, value: Option<PathBuf>) {
        self.ordering = value;
    }

    pub fn set_sol_file(&mut self, value: Option<PathBuf>) {
        self.sol_file = value;
    }

    pub fn set_algorithm(&mut self, value: Algorithm) {
        self.algorithm = value;
    }

    pub fn set_heuristic(&mut self, value: HeuristicChoice) {
        self.heuristic = value;
    }

    pub fn set_i_bound(&mut self, value: usize) {
        self.i_bound = value;
    }

    pub fn set_moment_matching(&mut self, value: bool) {
        self.moment_matching = value;
    }

    pub fn set_cache_bound(&mut self, value: Option<usize>) {
        self.cache_bound = value;
    }

    pub fn set_nocaching(&mut self, value: bool) {
        self.nocaching = value;
    }

    pub fn set_or_chain(&mut self, value: bool) {
        self.or_chain = value;
    }

    pub fn set_rotate(&mut self, value: bool) {
        self.rotate = value;
    }

    pub fn set_rotate_limit(&mut self, value: usize) {
        self.rotate_limit = value;
    }

    pub fn set_lds(&mut self, value: Option<usize>) {
        self.lds = value;
    }

    pub fn set_max_time(&mut self, value: Option<u64>) {
        self.max_time = value;
    }

    pub fn set_max_width(&mut self, value: Option<usize>) {
        self.max_width = value;
    }

    pub fn set_memory(&mut self, value: Option<u64>) {
        self.memory = value;
    }

    pub fn set_mplp(&mut self, value: usize) {
        self.mplp = value;
    }

    pub fn set_ndfglp(&mut self, value: usize) {
        self.ndfglp = value;
    }

    pub fn set_use_shifted_labels(&mut self, value: bool) {
        self.use_shifted_labels = value;
    }

    pub fn set_use_nullary_shift(&mut self, value: bool) {
        self.use_nullary_shift = value;
    }

    pub fn set_use_priority(&mut self, value: bool) {
        self.use_priority = value;
    }

    pub fn set_order_iter(&mut self, value: usize) {
        self.order_iter = value;
    }

    pub fn set_order_tolerance(&mut self, value: usize) {
        self.order_tolerance = value;
    }

    pub fn set_seed(&mut self, value: Option<u64>) {
        self.seed = value;
    }

    pub fn set_statistics(&mut self, value: bool) {
        self.statistics = value;
    }

    pub fn set_collapse(&mut self, value: bool) {
        self.collapse = value;
    }

    pub fn set_perturb(&mut self, value: f64) {
        self.perturb = value;
    }

    pub fn set_initial_bound(&mut self, value: Option<PathBuf>) {
        self.initial_bound = value;
    }

    pub fn set_subproblem(&mut self, value: Option<PathBuf>) {
        self.subproblem = value;
    }
}
