//! Loggable listener - writes a line per creation, change and removal

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn, Level};

use crate::config::BehaviorsConfig;
use crate::error::BehaviorResult;
use crate::events::{EventListener, LifecycleEventArgs};

/// Destination of change-log lines
pub trait ChangeLogger: Send + Sync {
    fn log(&self, message: &str);
}

/// Emits change-log lines as tracing events on the `elif_behaviors::changes` target
#[derive(Debug, Clone, Copy)]
pub struct TracingChangeLogger {
    level: Level,
}

impl TracingChangeLogger {
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    pub fn level(&self) -> Level {
        self.level
    }
}

impl Default for TracingChangeLogger {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl ChangeLogger for TracingChangeLogger {
    fn log(&self, message: &str) {
        if self.level == Level::ERROR {
            error!(target: "elif_behaviors::changes", "{}", message);
        } else if self.level == Level::WARN {
            warn!(target: "elif_behaviors::changes", "{}", message);
        } else if self.level == Level::INFO {
            info!(target: "elif_behaviors::changes", "{}", message);
        } else if self.level == Level::DEBUG {
            debug!(target: "elif_behaviors::changes", "{}", message);
        } else {
            trace!(target: "elif_behaviors::changes", "{}", message);
        }
    }
}

pub struct LoggableListener {
    logger: Arc<dyn ChangeLogger>,
}

impl LoggableListener {
    /// Listener logging through tracing at the configured level
    pub fn new(config: &BehaviorsConfig) -> BehaviorResult<Self> {
        let level = config.level()?;
        Ok(Self::with_logger(Arc::new(TracingChangeLogger::new(level))))
    }

    pub fn with_logger(logger: Arc<dyn ChangeLogger>) -> Self {
        Self { logger }
    }

    /// Refresh the entity's change set and log it unless nothing changed
    fn log_change_set(&self, args: &mut LifecycleEventArgs<'_>) -> BehaviorResult<()> {
        let handle = args.handle();
        args.unit_of_work_mut().compute_change_set(handle)?;

        let change_set = args.entity_change_set();
        let Some(loggable) = args.entity()?.as_loggable() else {
            return Ok(());
        };

        let message = loggable.update_log_message(&change_set)?;
        if !message.is_empty() {
            self.logger.log(&message);
        }
        Ok(())
    }
}

#[async_trait]
impl EventListener for LoggableListener {
    async fn post_persist(&self, args: &mut LifecycleEventArgs<'_>) -> BehaviorResult<()> {
        let Some(loggable) = args.entity()?.as_loggable() else {
            return Ok(());
        };

        let message = loggable.create_log_message()?;
        self.logger.log(&message);
        self.log_change_set(args)
    }

    async fn post_update(&self, args: &mut LifecycleEventArgs<'_>) -> BehaviorResult<()> {
        if args.entity()?.as_loggable().is_none() {
            return Ok(());
        }
        self.log_change_set(args)
    }

    async fn pre_remove(&self, args: &mut LifecycleEventArgs<'_>) -> BehaviorResult<()> {
        let Some(loggable) = args.entity()?.as_loggable() else {
            return Ok(());
        };

        let message = loggable.remove_log_message()?;
        self.logger.log(&message);
        Ok(())
    }
}
