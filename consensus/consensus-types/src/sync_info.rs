// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::quorum_cert::QuorumCert;
use serde::{Deserialize, Serialize};

/// spec.md GLOSSARY: "SyncInfo — bundle carried with proposals/votes
/// containing the sender's highest QC and TC so receivers can catch
/// up." Carried on every proposal and vote so a lagging receiver learns
/// about progress without a dedicated round trip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncInfo {
    highest_qc: QuorumCert,
    highest_tc: Option<QuorumCert>,
}

impl SyncInfo {
    pub fn new(highest_qc: QuorumCert, highest_tc: Option<QuorumCert>) -> Self {
        if let Some(tc) = &highest_tc {
            debug_assert!(tc.is_new_view(), "highest_tc must carry new_view = true");
        }
        Self {
            highest_qc,
            highest_tc,
        }
    }

    pub fn highest_qc(&self) -> &QuorumCert {
        &self.highest_qc
    }

    pub fn highest_tc(&self) -> Option<&QuorumCert> {
        self.highest_tc.as_ref()
    }

    pub fn highest_level(&self) -> u64 {
        self.highest_tc
            .as_ref()
            .map(|tc| tc.level())
            .unwrap_or(0)
            .max(self.highest_qc.level())
    }
}
