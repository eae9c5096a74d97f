//! Attestation round state machine
//!
//! One instance manages a single round of the commit-reveal scheme: it
//! collects attestation requests, snapshots and registers bit votes, resolves
//! the bit-vote consensus, prepares the Merkle commitment and drives the
//! two-round-delayed reveal. Phase transitions are announced by the external
//! scheduler; everything else is level triggered off validation completions.

use crate::attestation::{Attestation, AttestationStatus, VerificationOutcome};
use crate::config::{AttestationClientConfig, GlobalAttestationConfig};
use crate::connection::ChainConnection;
use crate::epoch::EpochSettings;
use crate::errors::{RoundError, RoundResult};
use crate::metrics;
use crate::source_limiter::SourceLimiterRegistry;
use crate::store::{AttestationRequestRecord, RoundSnapshot, RoundStateStore, VotingRoundResultRecord};
use crate::tasks::{retry, spawn_logged};
use crate::validation::AttestationValidator;
use attestor_consensus::{bit_voting_result, BitVoteOutcome};
use attestor_core::hash::{to_hex, un_prefix_0x};
use attestor_core::{commit_hash, crypto_safe_random, BitmaskAccumulator, Hash32, MerkleTree, ZERO_HASH};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// The empty vote substituted for default-set addresses that never voted
const NO_VOTE: &str = "0x00";

const INIT_RETRY_ATTEMPTS: u32 = 10;
const INIT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Round phase, announced by the external scheduler at fixed offsets from
/// the round start
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoundPhase {
    Collect,
    Choose,
    Commit,
    Reveal,
    Completed,
}

// !!! STATUS ORDER IS IMPORTANT. The round may only progress to a later
// status, never back; the only exceptions are the Error and
// ProcessingTimeout escapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoundStatus {
    /// Initial status
    Collecting,
    /// Votes can be calculated
    BitVotingClosed,
    /// Bit vote result calculated and available
    Chosen,
    /// Commit data prepared
    CommitDataPrepared,
    /// The round was successfully committed and a receipt received
    Committed,
    /// The round was successfully revealed and a receipt received
    Revealed,
    Error,
    ProcessingTimeout,
}

impl RoundStatus {
    /// Terminal statuses admit no further transition
    pub fn is_terminal(self) -> bool {
        matches!(self, RoundStatus::Revealed | RoundStatus::Error)
    }
}

/// A bit vote observed on the vote event feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitVoteData {
    /// Voting address
    pub sender: String,

    /// Submitted bitmask, hex
    pub bit_vote: String,
}

/// Mutable round state, serialized behind one lock
struct RoundInner {
    phase: RoundPhase,
    status: RoundStatus,

    attestations: Vec<Attestation>,
    /// canonical request id -> attestation index
    attestation_index: HashMap<String, usize>,
    attestations_processed: usize,
    duplicate_count: u64,

    source_limiters: SourceLimiterRegistry,

    /// default set voter addresses (lowercase), fetched at initialization
    default_set_addresses: Vec<String>,
    /// default set bit votes
    bit_vote_map: HashMap<String, String>,
    /// a record of my bit vote
    bit_vote_record: Option<String>,
    /// a result of bit voting
    bit_vote_result_indices: Vec<usize>,

    // submitted values, saved for the reveal
    round_merkle_root: Option<Hash32>,
    round_random: Option<Hash32>,
    round_masked_merkle_root: Option<Hash32>,

    initialized: bool,
}

/// Manages a specific attestation round, specifically the data in the
/// commit-reveal scheme
pub struct AttestationRound {
    round_id: u64,
    global_config: Arc<GlobalAttestationConfig>,
    client_config: Arc<AttestationClientConfig>,
    epoch_settings: EpochSettings,

    connection: Arc<dyn ChainConnection>,
    validator: Arc<dyn AttestationValidator>,
    store: Arc<dyn RoundStateStore>,

    inner: Mutex<RoundInner>,
}

impl AttestationRound {
    /// Creates the round in the `Collecting` status with a fresh source
    /// limiter registry
    pub fn new(
        round_id: u64,
        global_config: Arc<GlobalAttestationConfig>,
        client_config: Arc<AttestationClientConfig>,
        epoch_settings: EpochSettings,
        connection: Arc<dyn ChainConnection>,
        validator: Arc<dyn AttestationValidator>,
        store: Arc<dyn RoundStateStore>,
    ) -> Self {
        let source_limiters = SourceLimiterRegistry::from_config(&global_config.source_limits);
        Self {
            round_id,
            global_config,
            client_config,
            epoch_settings,
            connection,
            validator,
            store,
            inner: Mutex::new(RoundInner {
                phase: RoundPhase::Collect,
                status: RoundStatus::Collecting,
                attestations: Vec::new(),
                attestation_index: HashMap::new(),
                attestations_processed: 0,
                duplicate_count: 0,
                source_limiters,
                default_set_addresses: Vec::new(),
                bit_vote_map: HashMap::new(),
                bit_vote_record: None,
                bit_vote_result_indices: Vec::new(),
                round_merkle_root: None,
                round_random: None,
                round_masked_merkle_root: None,
                initialized: false,
            }),
        }
    }

    /// Round id of this instance
    pub fn round_id(&self) -> u64 {
        self.round_id
    }

    /// Current phase
    pub fn phase(&self) -> RoundPhase {
        self.inner.lock().phase
    }

    /// Current status
    pub fn status(&self) -> RoundStatus {
        self.inner.lock().status
    }

    /// Number of attestations collected so far
    pub fn attestation_count(&self) -> usize {
        self.inner.lock().attestations.len()
    }

    /// Number of attestations that finished processing
    pub fn processed_count(&self) -> usize {
        self.inner.lock().attestations_processed
    }

    /// Rejected duplicate submissions
    pub fn duplicate_count(&self) -> u64 {
        self.inner.lock().duplicate_count
    }

    /// The agreed attestation indices once the round is `Chosen`
    pub fn consensus_indices(&self) -> Vec<usize> {
        self.inner.lock().bit_vote_result_indices.clone()
    }

    /// Copy of the attestation at `index`
    pub fn attestation(&self, index: usize) -> Option<Attestation> {
        self.inner.lock().attestations.get(index).cloned()
    }

    /// The prepared commitment as `(merkle_root, masked_merkle_root, random)`
    pub fn commitment(&self) -> Option<(Hash32, Hash32, Hash32)> {
        let inner = self.inner.lock();
        match (inner.round_merkle_root, inner.round_masked_merkle_root, inner.round_random) {
            (Some(root), Some(masked), Some(random)) => Some((root, masked, random)),
            _ => None,
        }
    }

    /// This node's own bit-vote snapshot, once taken
    pub fn bit_vote_record(&self) -> Option<String> {
        self.inner.lock().bit_vote_record.clone()
    }

    /// Log prefix with client label, round id and position in the round window
    fn label(&self) -> String {
        let label = if self.client_config.label != "none" {
            format!("[{}]", self.client_config.label)
        } else {
            String::new()
        };
        let elapsed =
            now_ms().saturating_sub(self.epoch_settings.round_start_time_ms(self.round_id)) as f64 / 1000.0;
        format!("#{} {}:{:.1} ", label, self.round_id, elapsed)
    }

    /// Resolves the default voter set for this round. Retried with backoff;
    /// exhausting the retries fires the process-fatal callback.
    pub async fn initialize(&self) -> RoundResult<()> {
        if self.inner.lock().initialized {
            return Ok(());
        }
        let assigners = self.global_config.default_set_assigner_addresses.clone();
        let connection = self.connection.clone();
        let retry_label = format!("round {} init default set", self.round_id);
        let addresses = retry(&retry_label, INIT_RETRY_ATTEMPTS, INIT_RETRY_BACKOFF, || {
            let connection = connection.clone();
            let assigners = assigners.clone();
            async move { connection.get_attestor_addresses(&assigners).await }
        })
        .await
        .map_err(|err| RoundError::Initialization {
            round_id: self.round_id,
            reason: err.to_string(),
        })?;

        let mut inner = self.inner.lock();
        inner.default_set_addresses = addresses.into_iter().map(|address| address.to_lowercase()).collect();
        inner.initialized = true;
        Ok(())
    }

    /// The single status transition point. Backward moves are rejected;
    /// `Error` and `ProcessingTimeout` are reachable from any non-terminal
    /// status.
    fn advance_status_locked(&self, inner: &mut RoundInner, target: RoundStatus) -> bool {
        if inner.status.is_terminal() {
            warn!(
                "{}status '{:?}' is terminal, ignoring transition to '{:?}'",
                self.label(),
                inner.status,
                target
            );
            return false;
        }
        if matches!(target, RoundStatus::Error | RoundStatus::ProcessingTimeout) || target > inner.status {
            inner.status = target;
            return true;
        }
        if target < inner.status {
            warn!(
                "{}rejecting backward status transition '{:?}' -> '{:?}'",
                self.label(),
                inner.status,
                target
            );
        }
        false
    }

    fn advance_status(&self, target: RoundStatus) -> bool {
        let mut inner = self.inner.lock();
        self.advance_status_locked(&mut inner, target)
    }

    /// Phase announcements only ever move forward
    fn set_phase_locked(&self, inner: &mut RoundInner, phase: RoundPhase) {
        if phase > inner.phase {
            inner.phase = phase;
        } else if phase < inner.phase {
            warn!(
                "{}rejecting backward phase transition '{:?}' -> '{:?}'",
                self.label(),
                inner.phase,
                phase
            );
        }
    }

    /// Adds the attestation to this round and starts its validation
    pub fn add_attestation(self: &Arc<Self>, mut attestation: Attestation) {
        let mut inner = self.inner.lock();

        // de-duplicate on the canonical request id
        let request_id = attestation.data.id();
        if let Some(&existing_index) = inner.attestation_index.get(&request_id) {
            let existing = &inner.attestations[existing_index];
            debug!(
                "{}attestation {}.{} duplicate found {}.{}",
                self.label(),
                existing.data.block_number,
                existing.data.log_index,
                attestation.data.block_number,
                attestation.data.log_index
            );
            inner.duplicate_count += 1;
            metrics::ATTESTATION_DUPLICATES.inc();
            return;
        }

        let index = inner.attestations.len();
        attestation.index = index;
        attestation.round_id = self.round_id;
        let source_id = attestation.data.source_id;
        let already_failed = attestation.status == AttestationStatus::Failed;
        inner.attestation_index.insert(request_id, index);
        inner.attestations.push(attestation);
        metrics::ATTESTATIONS_ADDED.inc();

        // a request that failed parsing is processed without validation
        if already_failed {
            self.processed_locked(&mut inner);
            return;
        }

        if inner.source_limiters.can_proceed(source_id) {
            inner.attestations[index].status = AttestationStatus::Processing;
            let round = self.clone();
            let data = inner.attestations[index].data.clone();
            tokio::spawn(async move {
                let outcome = round.validator.validate(data).await;
                round.mark_processed(index, outcome);
            });
        } else {
            // over the source budget: processed, but never validated
            self.processed_locked(&mut inner);
        }
    }

    /// Validation completion callback; records the outcome and re-attempts
    /// the consensus and commit pipeline
    pub fn mark_processed(self: &Arc<Self>, index: usize, outcome: VerificationOutcome) {
        let mut inner = self.inner.lock();
        match inner.attestations.get_mut(index) {
            Some(attestation) => {
                attestation.status = outcome.status;
                attestation.verification = outcome.verification;
            }
            None => {
                error!("{}processed callback for unknown attestation index {}", self.label(), index);
                return;
            }
        }
        self.processed_locked(&mut inner);
    }

    fn processed_locked(self: &Arc<Self>, inner: &mut RoundInner) {
        inner.attestations_processed += 1;
        assert!(inner.attestations_processed <= inner.attestations.len());
        self.try_calculate_bit_voting_results_locked(inner);
        self.try_prepare_commit_data_locked(inner);
    }

    /// Registers a bit vote event. Only votes from the default set are kept;
    /// a later vote from the same address overwrites the earlier one.
    pub fn register_bit_vote(&self, vote: BitVoteData) {
        if BitmaskAccumulator::from_hex(&vote.bit_vote).is_err() {
            warn!("{}malformed bit vote from {} ignored", self.label(), vote.sender);
            return;
        }
        let address = vote.sender.to_lowercase();
        let mut inner = self.inner.lock();
        if inner.default_set_addresses.contains(&address) {
            inner.bit_vote_map.insert(address, vote.bit_vote);
            metrics::BIT_VOTES_REGISTERED.inc();
        }
    }

    /// Closes bit voting and attempts to resolve the round
    pub fn close_bit_voting(self: &Arc<Self>) {
        debug!("{}- close_bit_voting - call", self.label());
        let mut inner = self.inner.lock();
        if inner.status < RoundStatus::BitVotingClosed {
            info!("{}- close_bit_voting - closed", self.label());
            self.advance_status_locked(&mut inner, RoundStatus::BitVotingClosed);
            self.try_calculate_bit_voting_results_locked(&mut inner);
            self.try_prepare_commit_data_locked(&mut inner);
        }
    }

    /// Bitmask over the validity of this round's attestations
    pub fn bit_vote_accumulator(&self) -> BitmaskAccumulator {
        self.bit_vote_accumulator_locked(&self.inner.lock())
    }

    fn bit_vote_accumulator_locked(&self, inner: &RoundInner) -> BitmaskAccumulator {
        let mut bitmask = BitmaskAccumulator::new(inner.attestations.len());
        for attestation in &inner.attestations {
            bitmask.add_bit(attestation.status == AttestationStatus::Valid);
        }
        bitmask
    }

    /// Number of currently validated attestations
    pub fn number_of_validated_attestations(&self) -> usize {
        self.validated_count_locked(&self.inner.lock())
    }

    fn validated_count_locked(&self, inner: &RoundInner) -> usize {
        inner
            .attestations
            .iter()
            .filter(|attestation| attestation.status == AttestationStatus::Valid)
            .count()
    }

    /// The bit-vote payload: the low byte of the round id as a round check,
    /// followed by the snapshot bitmask. Most significant bit = index 0.
    fn bit_vote_mask_with_round_check(&self, record: &str) -> String {
        format!("0x{:02x}{}", (self.round_id & 0xff) as u8, un_prefix_0x(record))
    }

    /// Resolves the registered bit votes into the canonical attestation set.
    /// Re-entrant: called after voting closes and again whenever an
    /// attestation finishes processing, it only commits to `Chosen` once the
    /// selected attestations are all valid.
    fn try_calculate_bit_voting_results_locked(self: &Arc<Self>, inner: &mut RoundInner) {
        debug!("{}- try_calculate_bit_voting_results - call", self.label());
        if inner.status >= RoundStatus::Chosen {
            debug!("{}- try_calculate_bit_voting_results - already chosen", self.label());
            return;
        }
        // the vote count is final only in the commit phase with voting closed
        if inner.phase != RoundPhase::Commit {
            debug!(
                "{}- try_calculate_bit_voting_results - wrong phase '{:?}'",
                self.label(),
                inner.phase
            );
            return;
        }
        if inner.status != RoundStatus::BitVotingClosed {
            debug!("{}- try_calculate_bit_voting_results - voting not closed", self.label());
            return;
        }

        let votes: Vec<BitmaskAccumulator> = inner
            .default_set_addresses
            .iter()
            .map(|address| {
                let hex = inner.bit_vote_map.get(address).map(String::as_str).unwrap_or(NO_VOTE);
                BitmaskAccumulator::from_hex(hex).unwrap_or_else(|_| BitmaskAccumulator::new(8))
            })
            .collect();

        info!("{}Bit voting results", self.label());
        for (address, vote) in inner.default_set_addresses.iter().zip(&votes) {
            let short: String = address.chars().take(10).collect();
            info!("{}{} - {}", self.label(), short, vote.to_bit_string());
        }

        let consensus_subset_size = self.global_config.consensus_subset_size;
        let min_voters = self.global_config.min_voters();
        let attestation_count = inner.attestations.len();

        let (result_bitmask, indices) =
            match bit_voting_result(&votes, consensus_subset_size, min_voters, attestation_count) {
                BitVoteOutcome::IndexMismatch => {
                    error!(
                        "{}Bit vote indices do not match the number of attestations in round {}: \
                         attestations length {}. Abandoning consensus for this round.",
                        self.label(),
                        self.round_id,
                        attestation_count
                    );
                    return;
                }
                BitVoteOutcome::Inconclusive => (BitmaskAccumulator::new(attestation_count), Vec::new()),
                BitVoteOutcome::Candidate { bitmask, adopted_size } => {
                    info!(
                        "{}-RESULT[{}/{}] - {}",
                        self.label(),
                        adopted_size,
                        consensus_subset_size,
                        bitmask.to_bit_string()
                    );
                    let indices = bitmask.to_indices(attestation_count);
                    (bitmask, indices)
                }
            };

        // the round can only be chosen once every selected attestation is valid
        let mut count_valid = 0;
        for &index in &indices {
            let status = inner.attestations[index].status;
            if status == AttestationStatus::Valid {
                count_valid += 1;
                inner.attestations[index].chosen = true;
            } else if !status.is_pending() {
                info!("{}Unable to provide at least one required attestation.", self.label());
                return;
            }
        }
        if count_valid != indices.len() {
            info!(
                "{}Choose phase voting not successful yet. Status {}/{}",
                self.label(),
                count_valid,
                indices.len()
            );
            return;
        }

        inner.bit_vote_result_indices = indices;
        self.advance_status_locked(inner, RoundStatus::Chosen);
        info!(
            "{}Choose phase voting result successful. Status {}/{}",
            self.label(),
            count_valid,
            inner.bit_vote_result_indices.len()
        );

        let store = self.store.clone();
        let round_id = self.round_id;
        let bitmask_hex = result_bitmask.to_hex();
        spawn_logged("save_round_bit_vote_result", async move {
            store.save_bit_vote_result(round_id, bitmask_hex).await
        });
    }

    /// Computes the round's commitment from the chosen attestations. May be
    /// called too early and retried; a no-op once the data is prepared.
    fn try_prepare_commit_data_locked(self: &Arc<Self>, inner: &mut RoundInner) {
        debug!("{}- try_prepare_commit_data - call", self.label());
        if inner.status >= RoundStatus::CommitDataPrepared {
            debug!("{}- try_prepare_commit_data - commit already prepared", self.label());
            return;
        }
        if inner.phase != RoundPhase::Commit {
            debug!(
                "{}- try_prepare_commit_data - not commit phase: '{:?}'",
                self.label(),
                inner.phase
            );
            return;
        }
        if inner.status != RoundStatus::Chosen {
            debug!(
                "{}- try_prepare_commit_data - not status 'Chosen' ('{:?}' instead)",
                self.label(),
                inner.status
            );
            return;
        }

        // check that every attestation required by the bit vote result is valid
        let validated: Vec<usize> = inner
            .bit_vote_result_indices
            .iter()
            .copied()
            .filter(|&index| inner.attestations[index].status == AttestationStatus::Valid)
            .collect();
        if validated.len() != inner.bit_vote_result_indices.len() {
            error!(
                "{}round #{} cannot yet commit {}/{} attestations validated.",
                self.label(),
                self.round_id,
                validated.len(),
                inner.bit_vote_result_indices.len()
            );
            return;
        }

        if validated.is_empty() {
            error!(
                "{}round #{} nothing to commit - no valid attestation ({} attestation(s))",
                self.label(),
                self.round_id,
                inner.attestations.len()
            );
            if let Some(snapshot) = self.create_empty_state_locked(inner) {
                self.advance_status_locked(inner, RoundStatus::CommitDataPrepared);
                let store = self.store.clone();
                spawn_logged("save_round", async move { store.save_round(snapshot).await });
            }
            return;
        }

        info!(
            "{}round #{} committing ({}/{} attestation(s))",
            self.label(),
            self.round_id,
            validated.len(),
            inner.attestations.len()
        );

        // collect the response hashes in ascending attestation-index order;
        // this ordering is load-bearing for the shared Merkle root
        let mut hashes: Vec<Hash32> = Vec::with_capacity(validated.len());
        let mut request_records = Vec::with_capacity(validated.len());
        let mut result_records = Vec::with_capacity(validated.len());
        for &index in &validated {
            let attestation = &inner.attestations[index];
            let Some(verification) = &attestation.verification else {
                error!(
                    "{}attestation {} is valid but carries no verification data",
                    self.label(),
                    index
                );
                return;
            };
            hashes.push(verification.hash);
            request_records.push(attestation_request_record(attestation));
            result_records.push(VotingRoundResultRecord {
                round_id: self.round_id,
                hash: to_hex(&verification.hash),
                request: verification.request.clone(),
                response: verification.response.clone(),
            });
        }

        let tree = MerkleTree::new(&hashes);
        let random = crypto_safe_random();
        let masked = match commit_hash(&tree.root(), &random, &self.connection.submitter_address()) {
            Ok(masked) => masked,
            Err(err) => {
                error!("{}cannot derive masked merkle root: {}", self.label(), err);
                return;
            }
        };

        inner.round_merkle_root = Some(tree.root());
        inner.round_random = Some(random);
        inner.round_masked_merkle_root = Some(masked);
        self.advance_status_locked(inner, RoundStatus::CommitDataPrepared);

        let snapshot = self.snapshot_locked(inner, validated.len());
        let store = self.store.clone();
        spawn_logged("save_attestation_requests", {
            let store = store.clone();
            async move { store.save_attestation_requests(request_records).await }
        });
        spawn_logged("save_voting_round_results", {
            let store = store.clone();
            async move { store.save_voting_round_results(result_records).await }
        });
        spawn_logged("save_round", async move { store.save_round(snapshot).await });

        info!(
            "{}commit round #{} attestations: {}",
            self.label(),
            self.round_id,
            validated.len()
        );
    }

    /// Produces the empty commitment: the all-zero root masked with a fresh
    /// random value. Does not advance the status.
    fn create_empty_state_locked(&self, inner: &mut RoundInner) -> Option<RoundSnapshot> {
        debug!("{}create empty state for #{}", self.label(), self.round_id);
        let random = crypto_safe_random();
        let masked = match commit_hash(&ZERO_HASH, &random, &self.connection.submitter_address()) {
            Ok(masked) => masked,
            Err(err) => {
                error!("{}cannot derive masked merkle root: {}", self.label(), err);
                return None;
            }
        };
        inner.round_merkle_root = Some(ZERO_HASH);
        inner.round_random = Some(random);
        inner.round_masked_merkle_root = Some(masked);
        Some(self.snapshot_locked(inner, 0))
    }

    /// Empty-state fallback used when a commit or reveal needs this round's
    /// commitment before it was prepared
    pub fn create_empty_state(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        if let Some(snapshot) = self.create_empty_state_locked(&mut inner) {
            let store = self.store.clone();
            spawn_logged("save_round", async move { store.save_round(snapshot).await });
        }
    }

    fn snapshot_locked(&self, inner: &RoundInner, valid_count: usize) -> RoundSnapshot {
        RoundSnapshot {
            round_id: self.round_id,
            merkle_root: to_hex(&inner.round_merkle_root.unwrap_or(ZERO_HASH)),
            masked_merkle_root: to_hex(&inner.round_masked_merkle_root.unwrap_or(ZERO_HASH)),
            random: to_hex(&inner.round_random.unwrap_or(ZERO_HASH)),
            valid_count,
            attestation_count: inner.attestations.len(),
            duplicate_count: inner.duplicate_count,
        }
    }

    /// Announces the start of the choose phase
    pub fn start_choose_phase(&self) {
        let mut inner = self.inner.lock();
        info!(
            "{}choose phase started {}/{}",
            self.label(),
            inner.attestations_processed,
            inner.attestations.len()
        );
        self.set_phase_locked(&mut inner, RoundPhase::Choose);
    }

    /// Announces the start of the commit phase and re-attempts commit data
    /// preparation, covering the case where all requests finished early
    pub fn start_commit_phase(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        info!(
            "{}commit phase started {}/{}",
            self.label(),
            inner.attestations_processed,
            inner.attestations.len()
        );
        self.set_phase_locked(&mut inner, RoundPhase::Commit);
        self.try_prepare_commit_data_locked(&mut inner);
    }

    /// Announces the start of the reveal phase
    pub fn start_reveal_phase(&self) {
        let mut inner = self.inner.lock();
        info!("{}- reveal phase started", self.label());
        self.set_phase_locked(&mut inner, RoundPhase::Reveal);
    }

    /// Announces the end of the round
    pub fn completed(&self) {
        let mut inner = self.inner.lock();
        info!("{}- round completed", self.label());
        self.set_phase_locked(&mut inner, RoundPhase::Completed);
    }

    /// Marks a round that never finished processing its requests. Reported
    /// by the external scheduler, not detected internally.
    pub fn processing_timeout(&self) {
        let mut inner = self.inner.lock();
        if inner.status == RoundStatus::Collecting {
            error!(
                "{}round #{} processing timeout ({}/{} attestation(s))",
                self.label(),
                self.round_id,
                inner.attestations_processed,
                inner.attestations.len()
            );
            self.advance_status_locked(&mut inner, RoundStatus::ProcessingTimeout);
        }
    }

    /// True when the commitment for this round can be submitted
    pub fn can_commit(&self) -> bool {
        let inner = self.inner.lock();
        debug!(
            "{}can_commit(#{}) processed: {}, all: {}, phase: '{:?}', status: '{:?}'",
            self.label(),
            self.round_id,
            inner.attestations_processed,
            inner.attestations.len(),
            inner.phase,
            inner.status
        );
        inner.phase == RoundPhase::Commit && inner.status == RoundStatus::CommitDataPrepared
    }

    /// Submits this provider's bit vote. Called in the collect phase it
    /// re-arms itself; called after the choose phase it is a no-op.
    pub fn submit_bit_vote(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        match inner.phase {
            RoundPhase::Collect => {
                // too early, retry later
                drop(inner);
                let round = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    round.submit_bit_vote();
                });
            }
            RoundPhase::Choose => {
                // make a bit vote snapshot
                let record = self.bit_vote_accumulator_locked(&inner).to_hex();
                inner.bit_vote_record = Some(record.clone());
                let payload = self.bit_vote_mask_with_round_check(&record);
                let attestation_count = inner.attestations.len();
                let validated_count = self.validated_count_locked(&inner);
                let duplicate_count = inner.duplicate_count;
                drop(inner);

                let action = format!(
                    "{}bit voting for round #{} bufferNumber {}",
                    self.label(),
                    self.round_id + 1,
                    self.round_id + 1
                );
                let round = self.clone();
                tokio::spawn(async move {
                    let receipt = round
                        .connection
                        .submit_bit_vote(
                            &action,
                            round.round_id + 1,
                            payload,
                            attestation_count,
                            validated_count,
                            duplicate_count,
                        )
                        .await;
                    metrics::record_submission("bit_vote", receipt.is_some());
                    if receipt.is_some() {
                        info!(
                            "{}round #{} bit vote submitted (bufferNumber {})",
                            round.label(),
                            round.round_id,
                            round.round_id + 1
                        );
                    } else {
                        error!(
                            "{}round #{} bit vote submit error (bufferNumber {}) - no receipt",
                            round.label(),
                            round.round_id,
                            round.round_id + 1
                        );
                    }
                });
            }
            _ => {
                error!(
                    "{}round #{}: bit vote at wrong time in phase '{:?}'",
                    self.label(),
                    self.round_id,
                    inner.phase
                );
            }
        }
    }

    /// Submits this round's commitment for buffer `round_id + 1`, revealing
    /// the previous round from the store. Used for the first commit after
    /// the client starts, when no previous round instance exists in memory.
    pub async fn first_commit(self: &Arc<Self>) {
        if !self.can_commit() {
            self.create_empty_state();
        }
        let (root, masked, random) = self.commitment_or_zero();

        let previous = match self.round_id.checked_sub(1) {
            Some(previous_id) => match self.store.get_round(previous_id).await {
                Ok(stored) => stored,
                Err(err) => {
                    warn!("{}cannot read round #{} from store: {}", self.label(), self.round_id - 1, err);
                    None
                }
            },
            None => None,
        };
        let (reveal_root, reveal_random) = match previous {
            Some(stored) => (stored.merkle_root, stored.random),
            None => (ZERO_HASH, ZERO_HASH),
        };

        let action = format!(
            "{}Submitting #{} for bufferNumber {} (first commit)",
            self.label(),
            self.round_id,
            self.round_id + 1
        );
        let round = self.clone();
        tokio::spawn(async move {
            let receipt = round
                .connection
                .submit_attestation(
                    &action,
                    round.round_id + 1,
                    root,
                    masked,
                    random,
                    reveal_root,
                    reveal_random,
                )
                .await;
            metrics::record_submission("commit", receipt.is_some());
            if receipt.is_some() {
                round.advance_status(RoundStatus::Committed);
                info!("{}committed round #{}", round.label(), round.round_id);
            } else {
                round.advance_status(RoundStatus::Error);
            }
        });
    }

    /// Sends the reveal data for this round together with the commit data
    /// for the next round (two-round delay). The next round is resolved by
    /// the caller through the round registry.
    pub fn reveal(self: &Arc<Self>, next_round: Option<Arc<AttestationRound>>) {
        let (commit_prepared, own_root, own_random) = {
            let inner = self.inner.lock();
            if inner.phase != RoundPhase::Reveal {
                error!(
                    "{}round #{} cannot reveal (not in reveal phase: '{:?}')",
                    self.label(),
                    self.round_id,
                    inner.phase
                );
                return;
            }
            let commit_prepared =
                matches!(inner.status, RoundStatus::CommitDataPrepared | RoundStatus::Committed);
            if !commit_prepared {
                error!(
                    "{}round #{} not committed. Status: '{:?}'. Processed attestations: {}/{}",
                    self.label(),
                    self.round_id,
                    inner.status,
                    inner.attestations_processed,
                    inner.attestations.len()
                );
            }
            (
                commit_prepared,
                inner.round_merkle_root.unwrap_or(ZERO_HASH),
                inner.round_random.unwrap_or(ZERO_HASH),
            )
        };

        // commit data of the linked next round, zero fallback when not ready
        let (next_root, next_masked, next_random) = match &next_round {
            Some(next) => {
                if !next.can_commit() {
                    next.create_empty_state();
                }
                next.commitment_or_zero()
            }
            None => (ZERO_HASH, ZERO_HASH, ZERO_HASH),
        };

        let action = format!(
            "{}submitting #{} revealing #{} bufferNumber {}",
            self.label(),
            self.round_id + 1,
            self.round_id,
            self.round_id + 2
        );
        let round = self.clone();
        tokio::spawn(async move {
            let receipt = round
                .connection
                .submit_attestation(
                    &action,
                    round.round_id + 2,
                    next_root,
                    next_masked,
                    next_random,
                    if commit_prepared { own_root } else { ZERO_HASH },
                    if commit_prepared { own_random } else { ZERO_HASH },
                )
                .await;
            metrics::record_submission("reveal", receipt.is_some());
            if receipt.is_some() {
                info!(
                    "{}round #{} submit attestation completed (bufferNumber {})",
                    round.label(),
                    round.round_id,
                    round.round_id + 2
                );
                if let Some(next) = next_round {
                    next.advance_status(RoundStatus::Committed);
                }
                round.advance_status(RoundStatus::Revealed);
            } else {
                error!(
                    "{}round #{} submit error (bufferNumber {}) - no receipt",
                    round.label(),
                    round.round_id,
                    round.round_id + 2
                );
                round.advance_status(RoundStatus::Error);
            }
        });
    }

    /// Submits an all-zero commit/reveal tuple for buffer `round_id + 1`,
    /// finalizing the round three epochs back after a cold start
    pub fn start_commit_submit(self: &Arc<Self>) {
        if !self.client_config.submit_commit_finalize {
            return;
        }
        let finalized = self.round_id as i64 - 3;
        let action = format!("{}Finalizing #{}", self.label(), finalized);
        let round = self.clone();
        tokio::spawn(async move {
            let receipt = round
                .connection
                .submit_attestation(
                    &action,
                    round.round_id + 1,
                    ZERO_HASH,
                    ZERO_HASH,
                    ZERO_HASH,
                    ZERO_HASH,
                    ZERO_HASH,
                )
                .await;
            metrics::record_submission("finalize", receipt.is_some());
            if receipt.is_some() {
                info!("{}finalized round #{}", round.label(), finalized);
            }
        });
    }

    fn commitment_or_zero(&self) -> (Hash32, Hash32, Hash32) {
        let inner = self.inner.lock();
        (
            inner.round_merkle_root.unwrap_or(ZERO_HASH),
            inner.round_masked_merkle_root.unwrap_or(ZERO_HASH),
            inner.round_random.unwrap_or(ZERO_HASH),
        )
    }
}

fn attestation_request_record(attestation: &Attestation) -> AttestationRequestRecord {
    AttestationRequestRecord {
        round_id: attestation.round_id,
        block_number: attestation.data.block_number,
        log_index: attestation.data.log_index,
        attestation_status: format!("{:?}", attestation.status),
        verification_status: attestation.verification.as_ref().map(|v| v.status.clone()),
        request: attestation
            .verification
            .as_ref()
            .map(|v| v.request.clone())
            .unwrap_or_default(),
        response: attestation
            .verification
            .as_ref()
            .map(|v| v.response.clone())
            .unwrap_or_default(),
        hash: attestation.verification.as_ref().map(|v| to_hex(&v.hash)),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::AttestationData;
    use crate::source_limiter::SourceLimiterConfig;
    use crate::store::StoredCommitment;
    use async_trait::async_trait;

    struct NoopConnection;

    #[async_trait]
    impl ChainConnection for NoopConnection {
        fn submitter_address(&self) -> String {
            "0x1a0cc05953efa5b79b0d1d69db8a40ceea6df9aa".to_string()
        }

        async fn get_attestor_addresses(&self, _assigners: &[String]) -> RoundResult<Vec<String>> {
            Ok(vec!["0xA1".into(), "0xB2".into(), "0xC3".into()])
        }

        async fn submit_attestation(
            &self,
            _action: &str,
            _buffer_number: u64,
            _merkle_root: Hash32,
            _masked_merkle_root: Hash32,
            _random: Hash32,
            _reveal_merkle_root: Hash32,
            _reveal_random: Hash32,
        ) -> Option<crate::connection::SubmissionReceipt> {
            None
        }

        async fn submit_bit_vote(
            &self,
            _action: &str,
            _buffer_number: u64,
            _payload: String,
            _attestation_count: usize,
            _validated_count: usize,
            _duplicate_count: u64,
        ) -> Option<crate::connection::SubmissionReceipt> {
            None
        }
    }

    struct NoopValidator;

    #[async_trait]
    impl AttestationValidator for NoopValidator {
        async fn validate(&self, _data: AttestationData) -> VerificationOutcome {
            VerificationOutcome {
                status: AttestationStatus::Valid,
                verification: None,
            }
        }
    }

    struct NoopStore;

    #[async_trait]
    impl RoundStateStore for NoopStore {
        async fn save_round(&self, _snapshot: RoundSnapshot) -> RoundResult<()> {
            Ok(())
        }

        async fn save_bit_vote_result(&self, _round_id: u64, _bitmask: String) -> RoundResult<()> {
            Ok(())
        }

        async fn get_round(&self, _round_id: u64) -> RoundResult<Option<StoredCommitment>> {
            Ok(None)
        }

        async fn save_attestation_requests(
            &self,
            _records: Vec<AttestationRequestRecord>,
        ) -> RoundResult<()> {
            Ok(())
        }

        async fn save_voting_round_results(
            &self,
            _records: Vec<VotingRoundResultRecord>,
        ) -> RoundResult<()> {
            Ok(())
        }
    }

    fn test_round(round_id: u64) -> Arc<AttestationRound> {
        let mut global_config = GlobalAttestationConfig {
            default_set_assigner_addresses: vec!["0xa1".into(), "0xb2".into(), "0xc3".into()],
            consensus_subset_size: 3,
            ..Default::default()
        };
        global_config
            .source_limits
            .insert(1, SourceLimiterConfig { max_requests_per_round: 100 });
        Arc::new(AttestationRound::new(
            round_id,
            Arc::new(global_config),
            Arc::new(AttestationClientConfig::default()),
            EpochSettings::new(0, 90_000, 30_000),
            Arc::new(NoopConnection),
            Arc::new(NoopValidator),
            Arc::new(NoopStore),
        ))
    }

    fn request(request: &str) -> Attestation {
        Attestation::new(
            1,
            AttestationData {
                source_id: 1,
                request: request.to_string(),
                block_number: 10,
                log_index: 1,
            },
        )
    }

    #[test]
    fn test_status_never_moves_backward() {
        let round = test_round(1);
        let mut inner = round.inner.lock();
        assert!(round.advance_status_locked(&mut inner, RoundStatus::BitVotingClosed));
        assert!(round.advance_status_locked(&mut inner, RoundStatus::CommitDataPrepared));
        assert!(!round.advance_status_locked(&mut inner, RoundStatus::Chosen));
        assert_eq!(inner.status, RoundStatus::CommitDataPrepared);
        // the error escape is always open
        assert!(round.advance_status_locked(&mut inner, RoundStatus::Error));
        // but terminal statuses admit nothing further
        assert!(!round.advance_status_locked(&mut inner, RoundStatus::Revealed));
        assert_eq!(inner.status, RoundStatus::Error);
    }

    #[test]
    fn test_phase_never_moves_backward() {
        let round = test_round(1);
        round.start_reveal_phase();
        round.start_choose_phase();
        assert_eq!(round.phase(), RoundPhase::Reveal);
    }

    #[tokio::test]
    async fn test_duplicate_attestations_are_counted_not_stored() {
        let round = test_round(1);
        round.add_attestation(request("0xdeadbeef"));
        round.add_attestation(request("0xdeadbeef"));
        round.add_attestation(request("0xDEADBEEF"));
        assert_eq!(round.attestation_count(), 1);
        assert_eq!(round.duplicate_count(), 2);
    }

    #[tokio::test]
    async fn test_attestation_indices_assigned_in_order() {
        let round = test_round(1);
        round.add_attestation(request("0x01"));
        round.add_attestation(request("0x02"));
        round.add_attestation(request("0x03"));
        for index in 0..3 {
            assert_eq!(round.attestation(index).unwrap().index, index);
        }
    }

    #[tokio::test]
    async fn test_unconfigured_source_is_processed_without_validation() {
        let round = test_round(1);
        let mut attestation = request("0x01");
        attestation.data.source_id = 99;
        round.add_attestation(attestation);
        assert_eq!(round.processed_count(), 1);
        assert_eq!(round.attestation(0).unwrap().status, AttestationStatus::Queued);
    }

    #[tokio::test]
    async fn test_failed_attestation_is_processed_immediately() {
        let round = test_round(1);
        let mut attestation = request("0x01");
        attestation.status = AttestationStatus::Failed;
        round.add_attestation(attestation);
        assert_eq!(round.processed_count(), 1);
        assert_eq!(round.attestation(0).unwrap().status, AttestationStatus::Failed);
    }

    #[test]
    fn test_bit_vote_mask_carries_round_check_byte() {
        let round = test_round(0x1234);
        assert_eq!(round.bit_vote_mask_with_round_check("0xa0"), "0x34a0");
    }

    #[tokio::test]
    async fn test_register_bit_vote_filters_non_default_addresses() {
        let round = test_round(1);
        round.initialize().await.unwrap();
        round.register_bit_vote(BitVoteData { sender: "0xA1".into(), bit_vote: "0x80".into() });
        round.register_bit_vote(BitVoteData { sender: "0xEE".into(), bit_vote: "0x80".into() });
        round.register_bit_vote(BitVoteData { sender: "0xb2".into(), bit_vote: "0xzz".into() });
        let inner = round.inner.lock();
        assert_eq!(inner.bit_vote_map.len(), 1);
        assert!(inner.bit_vote_map.contains_key("0xa1"));
    }

    #[tokio::test]
    async fn test_close_bit_voting_is_idempotent() {
        let round = test_round(1);
        round.initialize().await.unwrap();
        round.close_bit_voting();
        assert_eq!(round.status(), RoundStatus::BitVotingClosed);
        round.close_bit_voting();
        assert_eq!(round.status(), RoundStatus::BitVotingClosed);
    }

    #[tokio::test]
    async fn test_processing_timeout_only_from_collecting() {
        let round = test_round(1);
        round.processing_timeout();
        assert_eq!(round.status(), RoundStatus::ProcessingTimeout);

        let round = test_round(2);
        round.close_bit_voting();
        round.processing_timeout();
        assert_eq!(round.status(), RoundStatus::BitVotingClosed);
    }
}
