//! User intents turned into device commands.
//!
//! Every command needs an established link. The control values are written
//! optimistically before the command goes out; the hardware mirror is left to
//! the next reconciliation.

use crate::domain::color::Rgb;
use crate::domain::error::{OrchestratorError, OrchestratorResult, TransportError};
use crate::domain::led::LedMode;
use crate::domain::models::{ConnectionStatus, DutyCycle};
use crate::orchestrator::Orchestrator;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Fan,
    Pump,
}

fn write_failed(operation: &'static str) -> impl FnOnce(TransportError) -> OrchestratorError {
    move |e| {
        warn!("{} failed => {}", operation, e);
        OrchestratorError::command_failed(operation, e)
    }
}

impl Orchestrator {
    fn ensure_connected(&self) -> OrchestratorResult<()> {
        match self.status() {
            ConnectionStatus::Connected => Ok(()),
            _ => Err(OrchestratorError::NotConnected),
        }
    }

    /// Switch the LED on with a color and animation, or off
    pub async fn set_led(
        &self,
        on: bool,
        color: Rgb,
        is_breathing: bool,
        is_rainbow: bool,
    ) -> OrchestratorResult<()> {
        self.ensure_connected()?;
        let mode = LedMode::from_flags(is_breathing, is_rainbow);
        self.update(|s| {
            s.controls.led_on = on;
            s.controls.color = color;
            s.controls.led_view = mode.view();
        });

        let result = if on {
            debug!(color = %color, ?mode, "Updating LED");
            self.transport.set_led(color, mode).await
        } else {
            self.transport.led_off().await
        };
        result.map_err(write_failed("write led state"))
    }

    /// Color picker entry point; `hex` is `#rrggbb`
    pub async fn set_led_hex(
        &self,
        on: bool,
        hex: &str,
        is_breathing: bool,
        is_rainbow: bool,
    ) -> OrchestratorResult<()> {
        let color =
            Rgb::from_hex(hex).map_err(|e| OrchestratorError::InvalidInput(e.to_string()))?;
        self.set_led(on, color, is_breathing, is_rainbow).await
    }

    pub async fn set_fan(&self, on: bool, duty: i64) -> OrchestratorResult<()> {
        self.ensure_connected()?;
        let duty = DutyCycle::clamped(duty);
        self.update(|s| {
            s.controls.fan_on = on;
            s.controls.fan_duty = duty;
        });

        let result = if on {
            self.transport.set_fan(duty).await
        } else {
            self.transport.fan_off().await
        };
        result.map_err(write_failed("write fan state"))
    }

    /// Apply a named fan duty, keeping the current fan toggle
    pub async fn apply_fan_preset(&self, id: &str) -> OrchestratorResult<()> {
        let preset = self
            .config
            .fan_presets
            .iter()
            .find(|preset| preset.id == id)
            .ok_or_else(|| OrchestratorError::InvalidInput(format!("unknown fan preset '{}'", id)))?;
        let fan_on = self.snapshot.borrow().controls.fan_on;
        self.set_fan(fan_on, preset.duty.value() as i64).await
    }

    pub async fn set_pump(&self, on: bool, duty: i64, voltage: u8) -> OrchestratorResult<()> {
        self.ensure_connected()?;
        let duty = DutyCycle::clamped(duty);
        self.update(|s| {
            s.controls.pump_on = on;
            s.controls.pump_duty = duty;
            s.controls.pump_voltage = voltage;
        });

        let result = if on {
            self.transport.set_pump(duty, voltage).await
        } else {
            self.transport.pump_off().await
        };
        result.map_err(write_failed("write pump state"))
    }

    pub async fn stop_led(&self) -> OrchestratorResult<()> {
        self.ensure_connected()?;
        self.update(|s| s.controls.led_on = false);
        self.transport.led_off().await.map_err(write_failed("write led state"))
    }

    pub async fn stop_fan(&self) -> OrchestratorResult<()> {
        self.ensure_connected()?;
        self.update(|s| s.controls.fan_on = false);
        self.transport.fan_off().await.map_err(write_failed("write fan state"))
    }

    pub async fn stop_pump(&self) -> OrchestratorResult<()> {
        self.ensure_connected()?;
        self.update(|s| s.controls.pump_on = false);
        self.transport.pump_off().await.map_err(write_failed("write pump state"))
    }

    pub async fn nudge_fan(&self, offset: i64) -> OrchestratorResult<()> {
        self.nudge(Channel::Fan, offset).await
    }

    pub async fn nudge_pump(&self, offset: i64) -> OrchestratorResult<()> {
        self.nudge(Channel::Pump, offset).await
    }

    async fn nudge(&self, channel: Channel, offset: i64) -> OrchestratorResult<()> {
        let controls = self.snapshot.borrow().controls.clone();
        match channel {
            Channel::Fan => {
                let duty = controls.fan_duty.offset(offset);
                self.set_fan(controls.fan_on, duty.value() as i64).await
            }
            Channel::Pump => {
                let duty = controls.pump_duty.offset(offset);
                self.set_pump(controls.pump_on, duty.value() as i64, controls.pump_voltage)
                    .await
            }
        }
    }

    /// Press-and-hold on a fan speed button
    pub fn hold_fan_nudge(self: &Arc<Self>, offset: i64) {
        self.hold(Channel::Fan, offset);
    }

    /// Press-and-hold on a pump speed button
    pub fn hold_pump_nudge(self: &Arc<Self>, offset: i64) {
        self.hold(Channel::Pump, offset);
    }

    /// Nudge once now and then every repeat interval. The repeat ends on
    /// release, when the link is gone, or when the orchestrator is dropped.
    fn hold(self: &Arc<Self>, channel: Channel, offset: i64) {
        let weak = Arc::downgrade(self);
        self.repeater().start(self.config.repeat_interval, move || {
            let weak = weak.clone();
            async move {
                let Some(orchestrator) = weak.upgrade() else {
                    return false;
                };
                match orchestrator.nudge(channel, offset).await {
                    Err(e) if e.is_silent() => {
                        debug!("Ending held nudge: {}", e);
                        false
                    }
                    _ => true,
                }
            }
        });
    }

    pub fn release_hold(&self) {
        self.repeater().stop();
    }

    pub fn is_holding(&self) -> bool {
        self.repeater().is_active()
    }
}
