//! Simulation controls shared with the web app's simulation engine.
//!
//! The engine reads two hashes from the shared store: `paused_simulations`
//! (field set to `"true"` means paused) and `sim_speed_multipliers`. The bot only
//! writes them; it never advances a shipment itself.

use std::sync::Arc;

use tracing::info;

use crate::errors::AppResult;
use crate::store::{keys, KeyValueStore};

pub const DEFAULT_SPEED: f64 = 1.0;
const PAUSED_FLAG: &str = "true";

#[derive(Clone)]
pub struct SimulationControl {
    store: Arc<dyn KeyValueStore>,
}

impl SimulationControl {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn is_paused(&self, tracking_number: &str) -> AppResult<bool> {
        Ok(self
            .store
            .hget(keys::PAUSED_SIMULATIONS, tracking_number)
            .await?
            .is_some_and(|v| v == PAUSED_FLAG))
    }

    pub async fn pause(&self, tracking_number: &str) -> AppResult<()> {
        self.store
            .hset(keys::PAUSED_SIMULATIONS, tracking_number, PAUSED_FLAG)
            .await?;
        info!(tracking_number = %tracking_number, "Simulation paused");
        Ok(())
    }

    pub async fn resume(&self, tracking_number: &str) -> AppResult<()> {
        self.store
            .hdel(keys::PAUSED_SIMULATIONS, tracking_number)
            .await?;
        info!(tracking_number = %tracking_number, "Simulation resumed");
        Ok(())
    }

    /// Current multiplier; unset or unreadable values read as 1.0.
    pub async fn speed(&self, tracking_number: &str) -> AppResult<f64> {
        let raw = self
            .store
            .hget(keys::SPEED_MULTIPLIERS, tracking_number)
            .await?;
        Ok(raw
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(DEFAULT_SPEED))
    }

    pub async fn set_speed(&self, tracking_number: &str, speed: f64) -> AppResult<()> {
        self.store
            .hset(keys::SPEED_MULTIPLIERS, tracking_number, &speed.to_string())
            .await?;
        info!(tracking_number = %tracking_number, speed = %speed, "Simulation speed updated");
        Ok(())
    }

    /// All paused tracking numbers, sorted.
    pub async fn paused_tracking_numbers(&self) -> AppResult<Vec<String>> {
        let mut paused = Vec::new();
        for tracking_number in self.store.hkeys(keys::PAUSED_SIMULATIONS).await? {
            if self.is_paused(&tracking_number).await? {
                paused.push(tracking_number);
            }
        }
        paused.sort();
        Ok(paused)
    }

    pub async fn paused_count(&self) -> AppResult<u64> {
        Ok(self.paused_tracking_numbers().await?.len() as u64)
    }

    /// Forget all simulation state for a deleted shipment.
    pub async fn clear(&self, tracking_number: &str) -> AppResult<()> {
        self.store
            .hdel(keys::PAUSED_SIMULATIONS, tracking_number)
            .await?;
        self.store
            .hdel(keys::SPEED_MULTIPLIERS, tracking_number)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_pause_and_resume() {
        let sim = SimulationControl::new(Arc::new(MemoryStore::new()));
        assert!(!sim.is_paused("TRK1").await.unwrap());
        sim.pause("TRK1").await.unwrap();
        sim.pause("TRK0").await.unwrap();
        assert!(sim.is_paused("TRK1").await.unwrap());
        assert_eq!(sim.paused_tracking_numbers().await.unwrap(), vec!["TRK0", "TRK1"]);
        assert_eq!(sim.paused_count().await.unwrap(), 2);

        sim.resume("TRK1").await.unwrap();
        assert!(!sim.is_paused("TRK1").await.unwrap());
    }

    #[tokio::test]
    async fn test_only_true_flag_counts_as_paused() {
        let store = Arc::new(MemoryStore::new());
        let sim = SimulationControl::new(store.clone());
        store.hset(keys::PAUSED_SIMULATIONS, "TRK1", "false").await.unwrap();
        assert!(!sim.is_paused("TRK1").await.unwrap());
        assert!(sim.paused_tracking_numbers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_speed_defaults_and_updates() {
        let store = Arc::new(MemoryStore::new());
        let sim = SimulationControl::new(store.clone());
        assert_eq!(sim.speed("TRK1").await.unwrap(), DEFAULT_SPEED);

        sim.set_speed("TRK1", 2.5).await.unwrap();
        assert_eq!(sim.speed("TRK1").await.unwrap(), 2.5);

        store.hset(keys::SPEED_MULTIPLIERS, "TRK2", "fast").await.unwrap();
        assert_eq!(sim.speed("TRK2").await.unwrap(), DEFAULT_SPEED);
    }

    #[tokio::test]
    async fn test_clear_removes_both_fields() {
        let store = Arc::new(MemoryStore::new());
        let sim = SimulationControl::new(store.clone());
        sim.pause("TRK1").await.unwrap();
        sim.set_speed("TRK1", 3.0).await.unwrap();

        sim.clear("TRK1").await.unwrap();
        assert!(store.hget(keys::PAUSED_SIMULATIONS, "TRK1").await.unwrap().is_none());
        assert!(store.hget(keys::SPEED_MULTIPLIERS, "TRK1").await.unwrap().is_none());
    }
}
