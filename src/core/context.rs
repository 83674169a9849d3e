//! The explicitly constructed pipeline context.
//!
//! [`ChatContext`] owns everything a message passes through: rules, the
//! compiled filter engine, the tab router, both registries and the speaker
//! history, all behind one mutex so configuration edits never interleave
//! with a message in flight. HUD buffers sit behind a separate
//! [`HudHandle`] so a render loop can read them without waiting on the
//! pipeline. When both are needed the pipeline lock is taken first.

use crate::core::config::Config;
use crate::core::error::ValidationError;
use crate::core::filter::FilterEngine;
use crate::core::hud::{Hud, HudHandle, RenderedLine};
use crate::core::registry::{
    EntryOptions, Factory, FormatContext, Formatter, Registries, RegistryEditor, RegistryError,
    SuggestContext, Suggestion, Suggestor,
};
use crate::core::router::{Channel, ChannelId, CycleDirection, TabRouter};
use crate::core::rule::{Rule, RuleId, RuleList};
use crate::core::sharing::{self, ImportError};
use crate::core::speakers::SpeakerTracker;
use crate::ui::span::StyledText;
use chrono::{DateTime, Local};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where a message ended up and what the host should do about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub channels: Vec<ChannelId>,
    /// Sounds requested by matching rules, in rule order.
    pub sounds: Vec<String>,
    /// The line as inserted into each channel's buffer.
    pub text: StyledText,
}

struct PipelineState {
    config: Config,
    rules: RuleList,
    engine: FilterEngine,
    router: TabRouter,
    registries: Registries,
    speakers: SpeakerTracker,
}

impl PipelineState {
    fn from_config(config: &Config) -> Self {
        let rules = RuleList::from_rules(config.rules.clone());
        let engine = FilterEngine::new(&rules);
        let router = TabRouter::new(
            config.channels.clone(),
            &config.tabs.main_name,
            &config.tabs.main_abbreviation,
        );
        let mut registries = Registries::builtin();
        registries.formatters_mut().apply_persisted(&config.formatters);
        registries.suggestors_mut().apply_persisted(&config.suggestors);

        Self {
            config: config.clone(),
            rules,
            engine,
            router,
            registries,
            speakers: SpeakerTracker::new(&config.general.message_owner_regex),
        }
    }

    fn channel_ids(&self) -> Vec<ChannelId> {
        self.router
            .channels()
            .iter()
            .map(|channel| channel.id.clone())
            .collect()
    }
}

pub struct ChatContext {
    state: Mutex<PipelineState>,
    hud: HudHandle,
}

impl std::fmt::Debug for ChatContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatContext").finish_non_exhaustive()
    }
}

impl ChatContext {
    pub fn new(config: &Config) -> Self {
        let state = PipelineState::from_config(config);
        info!(
            rules = state.rules.len(),
            active_rules = state.engine.active_rules(),
            tabs = state.router.channels().len(),
            "chat pipeline ready"
        );
        Self {
            state: Mutex::new(state),
            hud: HudHandle::new(Hud::new(config.hud_settings())),
        }
    }

    fn state(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one incoming line through the whole pipeline now.
    pub fn receive(&self, raw: &str) -> Option<Delivery> {
        self.receive_at(raw, Instant::now(), Local::now())
    }

    /// Filter, route, format and buffer one line.
    ///
    /// Returns `None` when a rule suppressed the line.
    pub fn receive_at(
        &self,
        raw: &str,
        now: Instant,
        received_at: DateTime<Local>,
    ) -> Option<Delivery> {
        let mut state = self.state();
        let message = state.engine.process(raw).into_iter().next()?;
        state.speakers.observe(raw);

        let channels = state.router.route(&message);
        let stack_key = message.text.plain().to_string();
        let ctx = FormatContext { received_at };
        let text = state.registries.formatters().apply(message.text, &ctx);
        {
            let mut hud = self.hud.write();
            for channel in &channels {
                hud.insert_keyed(channel, text.clone(), &stack_key, now);
            }
        }
        state.router.mark_delivered(&channels);

        Some(Delivery {
            channels,
            sounds: message.sounds,
            text,
        })
    }

    /// Completion candidates for the text being typed.
    pub fn suggest(&self, input: &str) -> Vec<Suggestion> {
        let state = self.state();
        let speakers = state.speakers.recent();
        let ctx = SuggestContext {
            input,
            speakers: &speakers,
        };
        state
            .registries
            .suggestors()
            .apply(&ctx, state.config.suggestions.max_suggestions)
    }

    /// Shared handle for the render path.
    pub fn hud(&self) -> HudHandle {
        self.hud.clone()
    }

    pub fn active_channel(&self) -> Channel {
        self.state().router.active().clone()
    }

    pub fn cycle_active(&self, direction: CycleDirection) -> Channel {
        self.state().router.cycle_active(direction).clone()
    }

    /// Select a tab; unknown ids select the main tab and return `false`.
    pub fn set_active(&self, id: &ChannelId) -> bool {
        self.state().router.set_active(id)
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.state().router.channels().to_vec()
    }

    pub fn unread(&self, id: &ChannelId) -> usize {
        self.state().router.unread(id)
    }

    /// Width of tab abbreviations in the side bar.
    pub fn side_chars(&self) -> usize {
        self.state().config.side_chars()
    }

    pub fn rules(&self) -> Vec<Rule> {
        self.state().rules.as_slice().to_vec()
    }

    pub fn scroll_active(&self, delta: isize) -> usize {
        let state = self.state();
        self.hud.scroll(state.router.active_id(), delta)
    }

    pub fn visible_active(&self, now: Instant) -> Vec<RenderedLine> {
        let state = self.state();
        self.hud.render(state.router.active_id(), now)
    }

    /// The connection dropped.
    pub fn disconnect(&self) {
        let state = self.state();
        if state.config.general.clear_on_disconnect {
            self.hud.write().reset_all();
            debug!("cleared tab history on disconnect");
        }
    }

    /// Replace everything with `config`, e.g. after a profile switch.
    ///
    /// History, unread counts and the active selection of tabs that still
    /// exist are kept.
    pub fn reload(&self, config: &Config) {
        let mut state = self.state();
        let previous = std::mem::replace(&mut *state, PipelineState::from_config(config));
        state.router.carry_view_from(&previous.router);
        let live = state.channel_ids();
        let mut hud = self.hud.write();
        hud.set_settings(config.hud_settings());
        hud.retain_channels(&live);
        info!(rules = state.rules.len(), tabs = live.len(), "configuration reloaded");
    }

    /// Edit the rule list as one unit: either every change in `edit` is
    /// applied and the engine recompiled, or none is.
    pub fn edit_rules<R>(
        &self,
        edit: impl FnOnce(&mut RuleList) -> Result<R, ValidationError>,
    ) -> Result<R, ValidationError> {
        let mut state = self.state();
        let mut draft = state.rules.clone();
        let result = edit(&mut draft)?;
        state.engine = FilterEngine::new(&draft);
        state.rules = draft;
        Ok(result)
    }

    /// Edit the tab list as one unit; buffers of removed tabs are dropped.
    pub fn edit_channels<R>(
        &self,
        edit: impl FnOnce(&mut TabRouter) -> Result<R, ValidationError>,
    ) -> Result<R, ValidationError> {
        let mut state = self.state();
        let mut draft = state.router.clone();
        let result = edit(&mut draft)?;
        state.router = draft;
        let live = state.channel_ids();
        self.hud.write().retain_channels(&live);
        Ok(result)
    }

    /// Toggle, configure or reorder formatters. New ones go through
    /// [`ChatContext::register_formatter`].
    pub fn edit_formatters<R>(
        &self,
        edit: impl FnOnce(&mut RegistryEditor<'_, dyn Formatter>) -> Result<R, RegistryError>,
    ) -> Result<R, RegistryError> {
        let mut state = self.state();
        edit(&mut state.registries.formatters_mut())
    }

    pub fn edit_suggestors<R>(
        &self,
        edit: impl FnOnce(&mut RegistryEditor<'_, dyn Suggestor>) -> Result<R, RegistryError>,
    ) -> Result<R, RegistryError> {
        let mut state = self.state();
        edit(&mut state.registries.suggestors_mut())
    }

    /// Add a formatter; fails if either registry already uses `id`.
    pub fn register_formatter(
        &self,
        id: &str,
        enabled: bool,
        options: EntryOptions,
        factory: Factory<dyn Formatter>,
    ) -> Result<(), RegistryError> {
        self.state()
            .registries
            .register_formatter(id, enabled, options, factory)
    }

    /// Add a suggestor; fails if either registry already uses `id`.
    pub fn register_suggestor(
        &self,
        id: &str,
        enabled: bool,
        options: EntryOptions,
        factory: Factory<dyn Suggestor>,
    ) -> Result<(), RegistryError> {
        self.state()
            .registries
            .register_suggestor(id, enabled, options, factory)
    }

    /// Shareable blob for the rule with this id or name.
    pub fn export_rule(&self, id_or_name: &str) -> Option<String> {
        let state = self.state();
        let rule = state.rules.find(id_or_name)?;
        sharing::export_rule(rule)
            .map_err(|err| warn!(rule = %rule.id, error = %err, "could not export rule"))
            .ok()
    }

    pub fn export_channel(&self, id_or_name: &str) -> Option<String> {
        let state = self.state();
        let channel = state.router.find(id_or_name)?;
        sharing::export_channel(channel)
            .map_err(|err| warn!(tab = %channel.id, error = %err, "could not export tab"))
            .ok()
    }

    /// Parse a rule blob and append it. Nothing changes on error.
    pub fn import_rule(&self, blob: &str) -> Result<RuleId, ImportError> {
        let rule = sharing::import_rule(blob).inspect_err(|err| {
            warn!(error = %err, "rule import rejected");
        })?;
        Ok(self.edit_rules(|rules| rules.add(rule))?)
    }

    /// Parse a tab blob and append it. Nothing changes on error.
    pub fn import_channel(&self, blob: &str) -> Result<ChannelId, ImportError> {
        let channel = sharing::import_channel(blob).inspect_err(|err| {
            warn!(error = %err, "tab import rejected");
        })?;
        Ok(self.edit_channels(|router| router.add_channel(channel))?)
    }

    /// Snapshot the current state for saving.
    pub fn to_config(&self) -> Config {
        let state = self.state();
        Config {
            rules: state.rules.as_slice().to_vec(),
            channels: state.router.channels().to_vec(),
            formatters: state.registries.formatters().to_persisted(),
            suggestors: state.registries.suggestors().to_persisted(),
            ..state.config.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::formatter::TIMESTAMP;
    use crate::core::router::Membership;
    use crate::core::rule::RuleAction;
    use crate::utils::test_utils::{fixed_time, rule, sample_config};
    use std::sync::Arc;
    use std::time::Duration;

    fn plain(lines: &[RenderedLine]) -> Vec<&str> {
        lines.iter().map(|line| line.text.plain()).collect()
    }

    #[test]
    fn colorized_line_lands_in_main() {
        let context = ChatContext::new(&sample_config());
        let delivery = context.receive("<Steve> hello").expect("not suppressed");

        assert_eq!(delivery.channels, vec![ChannelId::from("main")]);
        let segments: Vec<_> = delivery.text.segments().collect();
        assert_eq!(segments[0].0, "<Steve>");
        assert!(segments[0].1.is_some());
        assert_eq!(segments[1], (" hello", None));
    }

    #[test]
    fn rule_membership_routes_away_from_main() {
        let context = ChatContext::new(&sample_config());
        let delivery = context.receive("[Mod] keep it civil").expect("delivered");

        assert_eq!(delivery.channels, vec![ChannelId::from("staff")]);
        assert_eq!(context.unread(&ChannelId::from("staff")), 1);
        assert!(context.visible_active(Instant::now()).is_empty());
    }

    #[test]
    fn suppressed_lines_touch_nothing() {
        let context = ChatContext::new(&sample_config());
        assert!(context.receive("buy gold at spam.example").is_none());
        assert!(context.visible_active(Instant::now()).is_empty());
        assert!(context.suggest("").is_empty());
    }

    #[test]
    fn sounds_are_reported() {
        let context = ChatContext::new(&sample_config());
        let delivery = context.receive("<Alex> hey Steve").expect("delivered");
        assert_eq!(delivery.sounds, vec!["block.note_block.pling".to_string()]);
    }

    #[test]
    fn formatters_run_before_buffering() {
        let context = ChatContext::new(&sample_config());
        context
            .edit_formatters(|formatters| formatters.set_enabled(TIMESTAMP, true))
            .unwrap();

        let delivery = context
            .receive_at("§ehi", Instant::now(), fixed_time())
            .expect("delivered");
        assert_eq!(delivery.text.plain(), "[09:30] hi");
        assert_eq!(
            plain(&context.visible_active(Instant::now())),
            vec!["[09:30] hi"]
        );
    }

    #[test]
    fn repeated_lines_stack_in_the_buffer() {
        let context = ChatContext::new(&sample_config());
        context.receive("server restarting");
        context.receive("server restarting");

        let visible = context.visible_active(Instant::now());
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].stack_count, 2);
    }

    #[test]
    fn timestamped_repeats_stack_across_minutes() {
        let context = ChatContext::new(&sample_config());
        context
            .edit_formatters(|formatters| formatters.set_enabled(TIMESTAMP, true))
            .unwrap();

        let now = Instant::now();
        context.receive_at("server restarting", now, fixed_time());
        context.receive_at(
            "server restarting",
            now + Duration::from_secs(60),
            fixed_time() + chrono::Duration::minutes(1),
        );

        let visible = context.visible_active(now);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].stack_count, 2);
        assert_eq!(visible[0].text.plain(), "[09:31] server restarting");
    }

    #[test]
    fn registering_through_the_context_keeps_ids_disjoint() {
        let context = ChatContext::new(&sample_config());
        let taken = context.to_config().formatters[0].id.clone();
        let commands: Factory<dyn Suggestor> = Box::new(|_: &EntryOptions| {
            Box::new(crate::core::registry::suggestor::CommandSuggestor::default())
                as Box<dyn Suggestor>
        });
        assert_eq!(
            context.register_suggestor(&taken, true, EntryOptions::new(), commands),
            Err(RegistryError::DuplicateId(taken.clone()))
        );

        let echo: Factory<dyn Suggestor> = Box::new(|_: &EntryOptions| {
            Box::new(crate::core::registry::suggestor::CommandSuggestor::default())
                as Box<dyn Suggestor>
        });
        context
            .register_suggestor("more_commands", false, EntryOptions::new(), echo)
            .unwrap();
        context
            .edit_suggestors(|suggestors| suggestors.move_to("more_commands", 0))
            .unwrap();

        let config = context.to_config();
        assert_eq!(config.suggestors[0].id, "more_commands");
        for formatter in &config.formatters {
            assert!(config.suggestors.iter().all(|s| s.id != formatter.id));
        }
    }

    #[test]
    fn suggestions_use_recent_speakers() {
        let context = ChatContext::new(&sample_config());
        context.receive("<Steve> hi");
        context.receive("<Sam> yo");

        let replacements: Vec<_> = context
            .suggest("/msg S")
            .into_iter()
            .map(|s| s.replacement)
            .collect();
        assert_eq!(replacements, vec!["Sam", "Steve"]);
    }

    #[test]
    fn failed_rule_edit_changes_nothing() {
        let context = ChatContext::new(&sample_config());
        let before = context.rules();

        let result = context.edit_rules(|rules| {
            rules.add(rule("first", "ok", RuleAction::Suppress))?;
            rules.add(rule("second", "(", RuleAction::Suppress))
        });
        assert!(result.is_err());
        assert_eq!(context.rules(), before);
        assert!(context.receive("ok").is_some());
    }

    #[test]
    fn rule_edits_take_effect_immediately() {
        let context = ChatContext::new(&sample_config());
        context
            .edit_rules(|rules| rules.add(rule("mute", "^<Steve>", RuleAction::Suppress)))
            .unwrap();
        assert!(context.receive("<Steve> hi").is_none());

        context
            .edit_rules(|rules| rules.set_enabled(&RuleId::from("mute"), false))
            .unwrap();
        assert!(context.receive("<Steve> hi").is_some());
    }

    #[test]
    fn removing_active_tab_falls_back_and_drops_history() {
        let context = ChatContext::new(&sample_config());
        context.receive("[Mod] hello");
        assert!(context.set_active(&ChannelId::from("staff")));
        assert_eq!(context.visible_active(Instant::now()).len(), 1);

        context
            .edit_channels(|router| router.remove_channel(&ChannelId::from("staff")))
            .unwrap();
        assert!(context.active_channel().is_main);
        assert!(context
            .hud()
            .read()
            .buffer(&ChannelId::from("staff"))
            .is_none());
    }

    #[test]
    fn disconnect_clears_history_when_configured() {
        let context = ChatContext::new(&sample_config());
        context.receive("hello");
        context.disconnect();
        assert!(context.visible_active(Instant::now()).is_empty());

        let mut config = sample_config();
        config.general.clear_on_disconnect = false;
        let context = ChatContext::new(&config);
        context.receive("hello");
        context.disconnect();
        assert_eq!(context.visible_active(Instant::now()).len(), 1);
    }

    #[test]
    fn reload_keeps_history_of_surviving_tabs() {
        let context = ChatContext::new(&sample_config());
        context.receive("hello");
        context.receive("[Mod] hi");

        let mut config = sample_config();
        config.channels.retain(|c| c.id.as_str() != "staff");
        config.rules.clear();
        context.reload(&config);

        assert_eq!(plain(&context.visible_active(Instant::now())), vec!["hello"]);
        assert!(context
            .hud()
            .read()
            .buffer(&ChannelId::from("staff"))
            .is_none());
        assert!(context.receive("buy gold at spam.example").is_some());
    }

    #[test]
    fn reload_keeps_the_active_tab_and_unread_counts() {
        let context = ChatContext::new(&sample_config());
        assert!(context.set_active(&ChannelId::from("staff")));
        context.receive("hello");
        context.receive("again");
        assert_eq!(context.unread(&ChannelId::from("main")), 2);

        context.reload(&sample_config());
        assert_eq!(context.active_channel().id, ChannelId::from("staff"));
        assert_eq!(context.unread(&ChannelId::from("main")), 2);

        let mut config = sample_config();
        config.channels.retain(|c| c.id.as_str() != "staff");
        context.reload(&config);
        assert!(context.active_channel().is_main);
        assert_eq!(context.unread(&ChannelId::from("main")), 0);
    }

    #[test]
    fn import_after_an_extreme_persisted_order_appends_last() {
        let mut config = sample_config();
        config.rules[1].order = i64::MAX;
        let context = ChatContext::new(&config);

        let blob = context.export_rule("names").expect("rule exists");
        let id = context.import_rule(&blob).unwrap();

        let rules = context.rules();
        assert_eq!(rules.last().map(|r| &r.id), Some(&id));
        let orders: Vec<i64> = rules.iter().map(|r| r.order).collect();
        assert_eq!(orders, (0..rules.len() as i64).collect::<Vec<_>>());
    }

    #[test]
    fn export_then_import_appends_a_copy() {
        let context = ChatContext::new(&sample_config());
        let blob = context.export_rule("mute spam").expect("rule exists");
        let id = context.import_rule(&blob).unwrap();

        let rules = context.rules();
        let last = rules.last().unwrap();
        assert_eq!(last.id, id);
        assert_eq!(last.pattern, rules[0].pattern);
        assert_eq!(last.order, rules.len() as i64 - 1);

        let tab = context.export_channel("Staff").expect("tab exists");
        let tab_id = context.import_channel(&tab).unwrap();
        assert_eq!(context.channels().last().unwrap().id, tab_id);

        let before = context.rules();
        assert!(context.import_rule("{\"kind\":\"rule\"").is_err());
        assert_eq!(context.rules(), before);
    }

    #[test]
    fn to_config_round_trips_through_a_new_context() {
        let context = ChatContext::new(&sample_config());
        context
            .edit_channels(|router| {
                router.add_channel(Channel::new("Trade", Membership::Hints).with_id("trade"))
            })
            .unwrap();
        context
            .edit_suggestors(|suggestors| suggestors.move_to("players", 0))
            .unwrap();

        let saved = context.to_config();
        let restored = ChatContext::new(&saved);
        assert_eq!(restored.channels(), context.channels());
        assert_eq!(restored.rules(), context.rules());
        assert_eq!(restored.to_config(), saved);
    }

    #[test]
    fn render_path_reads_while_messages_arrive() {
        let context = Arc::new(ChatContext::new(&sample_config()));
        let hud = context.hud();
        let producer = {
            let context = Arc::clone(&context);
            std::thread::spawn(move || {
                for i in 0..300 {
                    context.receive(&format!("line {i}"));
                }
            })
        };
        let main = ChannelId::from("main");
        for _ in 0..100 {
            let lines = hud.render(&main, Instant::now() + Duration::from_secs(1));
            assert!(lines.iter().all(|l| l.text.plain().starts_with("line ")));
        }
        producer.join().unwrap();
        let len = hud.read().buffer(&main).map_or(0, |b| b.len());
        assert_eq!(len, 200);
    }
}
