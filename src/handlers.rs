//! Chat command handling: maps a parsed command onto registry and
//! dispatcher operations and returns the replies to send.

use std::sync::Arc;

use momo_channels::Command;
use momo_core::error::{MomoError, Result};
use momo_core::{UserId, UserSubscription, messages};
use momo_scheduler::{Dispatcher, SelectionRegistry};

#[derive(Clone)]
pub struct Bot {
    registry: Arc<SelectionRegistry>,
    dispatcher: Arc<Dispatcher>,
}

impl Bot {
    pub fn new(registry: Arc<SelectionRegistry>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            registry,
            dispatcher,
        }
    }

    /// Run one command for `user`. Returns the replies in order.
    pub fn handle(&self, user: &UserId, command: Command) -> Result<Vec<String>> {
        let replies = match command {
            Command::Start => {
                self.registry.ensure_scheduled(user)?;
                vec![menu(&self.registry.get(user)?)]
            }
            Command::Help | Command::Unknown => vec![messages::HELP.to_string()],
            Command::Status => vec![menu(&self.registry.get(user)?)],
            Command::Clear => {
                self.registry.clear(user)?;
                vec![messages::CLEARED.to_string()]
            }
            Command::Toggle(selector) => vec![menu(&self.registry.toggle(user, selector)?)],
            Command::MissingName(_) => vec![messages::MISSING_AREA_NAME.to_string()],
            Command::Accept => self.accept(user)?,
            Command::SetTime { hour, minute } => {
                match self.registry.set_notify_time(user, hour, minute) {
                    Ok(sub) => vec![messages::time_updated(hour, minute, sub.auto_send_enabled)],
                    Err(MomoError::InvalidTimeRange { .. }) => {
                        vec![messages::BAD_TIME_FORMAT.to_string()]
                    }
                    Err(e) => return Err(e),
                }
            }
            Command::BadTime => vec![messages::BAD_TIME_FORMAT.to_string()],
        };
        Ok(replies)
    }

    /// Show the report now and switch on the daily delivery.
    fn accept(&self, user: &UserId) -> Result<Vec<String>> {
        if self.registry.get(user)?.selectors.is_empty() {
            return Ok(vec![messages::SELECT_FIRST.to_string()]);
        }
        let mut replies = vec![self.dispatcher.compute_now(user)?];
        let acceptance = self.registry.mark_accepted(user)?;
        if acceptance.newly_enabled {
            let time = acceptance.subscription.notify_time;
            replies.push(messages::auto_send_enabled(time.hour(), time.minute()));
        }
        Ok(replies)
    }
}

fn menu(sub: &UserSubscription) -> String {
    let names: Vec<String> = sub
        .selectors
        .iter()
        .map(|s| s.display_name().to_string())
        .collect();
    messages::menu(
        &names,
        sub.notify_time.hour(),
        sub.notify_time.minute(),
        sub.auto_send_enabled,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use momo_channels::parse;
    use momo_core::config::ScheduleConfig;
    use momo_core::{DeliveryOutcome, Messenger, NotifyTime};
    use momo_data::DatasetStore;
    use momo_scheduler::{JobScheduler, SchedulerDb};

    struct Silent;

    #[async_trait]
    impl Messenger for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        async fn send(&self, _user: &UserId, _text: &str) -> DeliveryOutcome {
            DeliveryOutcome::Delivered
        }
    }

    fn bot() -> (Bot, Arc<JobScheduler>) {
        let tz = ScheduleConfig::default().tz().unwrap();
        let db = Arc::new(SchedulerDb::open_in_memory().unwrap());
        let scheduler = Arc::new(JobScheduler::new(db.clone(), tz, NotifyTime::default()));
        let registry = Arc::new(SelectionRegistry::new(db, scheduler.clone(), NotifyTime::default()));
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            Arc::new(DatasetStore::new()),
            Arc::new(Silent),
            tz,
        ));
        (Bot::new(registry, dispatcher), scheduler)
    }

    #[test]
    fn test_accept_requires_selection() {
        let (bot, scheduler) = bot();
        let u = UserId::from(1);
        let replies = bot.handle(&u, parse("/aceptar")).unwrap();
        assert_eq!(replies, vec![messages::SELECT_FIRST.to_string()]);
        assert!(scheduler.jobs().unwrap().is_empty());
    }

    #[test]
    fn test_accept_enables_once() {
        let (bot, scheduler) = bot();
        let u = UserId::from(1);
        bot.handle(&u, parse("/nacional")).unwrap();

        let first = bot.handle(&u, parse("/aceptar")).unwrap();
        assert_eq!(first.len(), 2);
        // No dataset loaded in this test.
        assert_eq!(first[0], messages::DATA_UNAVAILABLE);
        assert!(first[1].contains("*12:00*"));

        let second = bot.handle(&u, parse("/aceptar")).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(scheduler.jobs().unwrap().len(), 1);
    }

    #[test]
    fn test_settime_out_of_range() {
        let (bot, _) = bot();
        let u = UserId::from(1);
        let replies = bot.handle(&u, parse("/settime 25:00")).unwrap();
        assert_eq!(replies, vec![messages::BAD_TIME_FORMAT.to_string()]);
        let replies = bot.handle(&u, parse("/settime 07:45")).unwrap();
        assert!(replies[0].contains("guardada"));
    }

    #[test]
    fn test_toggle_shows_menu() {
        let (bot, _) = bot();
        let u = UserId::from(1);
        let replies = bot.handle(&u, parse("/ccaa Madrid")).unwrap();
        assert!(replies[0].contains("\n - Madrid"));
        let replies = bot.handle(&u, parse("/ccaa Madrid")).unwrap();
        assert!(replies[0].contains("Ninguna"));
    }

    #[test]
    fn test_clear_cancels_schedule() {
        let (bot, scheduler) = bot();
        let u = UserId::from(1);
        bot.handle(&u, parse("/nacional")).unwrap();
        bot.handle(&u, parse("/aceptar")).unwrap();
        bot.handle(&u, parse("/borrar")).unwrap();
        assert!(scheduler.jobs().unwrap().is_empty());
    }
}
