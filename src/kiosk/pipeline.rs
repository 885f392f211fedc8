//! Final Processing Pipeline
//!
//! gate-in -> CMS print -> truck-in -> portal open, strictly in order.
//! The first failure aborts the remaining stages; nothing is retried.

use tracing::{error, info};

use super::adapters::Collaborators;
use super::error::PipelineError;
use super::types::{CmsItem, CmsPrintJob, GateAction, GateInRequest};

/// Pipeline stage, announced to the progress sink before it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    GateIn,
    PrintCms,
    ConfirmTruckIn,
    OpenGate,
    /// Terminal: every stage succeeded
    Complete,
}

impl PipelineStage {
    pub fn progress(&self) -> u8 {
        match self {
            PipelineStage::GateIn => 20,
            PipelineStage::PrintCms => 50,
            PipelineStage::ConfirmTruckIn => 75,
            PipelineStage::OpenGate => 90,
            PipelineStage::Complete => 100,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            PipelineStage::GateIn => "Sending GateIn to backend...",
            PipelineStage::PrintCms => "GateIn successful. Printing CMS...",
            PipelineStage::ConfirmTruckIn => "CMS Printed. Sending TruckIn confirmation...",
            PipelineStage::OpenGate => "Transaction complete! Opening portal.",
            PipelineStage::Complete => "Portal opened. Thank you!",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::GateIn => "GATE_IN",
            PipelineStage::PrintCms => "PRINT_CMS",
            PipelineStage::ConfirmTruckIn => "CONFIRM_TRUCK_IN",
            PipelineStage::OpenGate => "OPEN_GATE",
            PipelineStage::Complete => "COMPLETE",
        }
    }
}

/// Successful pipeline result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// Backend-echoed id, or the generated one when the backend echoed none
    pub transaction_id: String,
    pub cms_items: Vec<CmsItem>,
}

pub struct FinalPipeline {
    collaborators: Collaborators,
}

impl FinalPipeline {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    /// Run every stage for `request`.
    ///
    /// `on_stage` is called when each stage begins and once more with
    /// [`PipelineStage::Complete`] on success.
    pub async fn run<F>(
        &self,
        request: GateInRequest,
        mut on_stage: F,
    ) -> Result<PipelineOutcome, PipelineError>
    where
        F: FnMut(PipelineStage),
    {
        let backend = &self.collaborators.backend;
        let generated_id = request.transaction_id;

        // 1. Gate-in registration
        on_stage(PipelineStage::GateIn);
        let result = backend
            .gate_in(&request)
            .await
            .map_err(PipelineError::GateIn)
            .inspect_err(|e| error!(transaction_id = %generated_id, error = %e, "GateIn call failed"))?;

        if !result.status {
            let reason = result
                .result
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| PipelineError::DEFAULT_GATE_IN_FAILURE.to_string());
            error!(transaction_id = %generated_id, reason = %reason, "GateIn rejected");
            return Err(PipelineError::GateInRejected(reason));
        }

        let cms_items = result.cms_items.unwrap_or_default();
        if cms_items.is_empty() {
            error!(transaction_id = %generated_id, "GateIn returned no CMS items");
            return Err(PipelineError::EmptyCms);
        }

        let transaction_id = result
            .transaction_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| generated_id.to_string());
        info!(
            transaction_id = %transaction_id,
            items = cms_items.len(),
            "GateIn successful"
        );

        // 2. CMS documents
        on_stage(PipelineStage::PrintCms);
        let job = CmsPrintJob {
            transaction_id: transaction_id.clone(),
            cms_items,
            gate_name: request.gate_name,
            tag_number: request.rfid.main,
            tractor_number: request.rfid.sub,
        };
        self.collaborators
            .printer
            .print_cms(&job)
            .await
            .map_err(PipelineError::PrintCms)
            .inspect_err(|e| error!(transaction_id = %transaction_id, error = %e, "CMS print failed"))?;

        // 3. Truck-in confirmation
        on_stage(PipelineStage::ConfirmTruckIn);
        backend
            .confirm_truck_in(&transaction_id)
            .await
            .map_err(PipelineError::TruckIn)
            .inspect_err(|e| error!(transaction_id = %transaction_id, error = %e, "TruckIn failed"))?;

        // 4. Portal
        on_stage(PipelineStage::OpenGate);
        self.collaborators
            .gate
            .actuate_gate(GateAction::Open)
            .await
            .map_err(PipelineError::Gate)
            .inspect_err(|e| error!(transaction_id = %transaction_id, error = %e, "Portal open failed"))?;

        on_stage(PipelineStage::Complete);
        info!(transaction_id = %transaction_id, "Final processing complete");

        Ok(PipelineOutcome {
            transaction_id,
            cms_items: job.cms_items,
        })
    }
}
