//! Simulation utilities for exercising the ledger at scale.
