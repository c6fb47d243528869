//! Rule lifecycle: validation, persistence, and live matcher registration.
//!
//! The invariant maintained across create/update/delete is that an active
//! rule has exactly one live matcher. Updates unregister the old matcher
//! before registering the replacement, so no event can ever hit two
//! versions of the same rule.

use std::sync::Arc;

use regex::Regex;
use tracing::{info, warn};

use barite_model::{MatcherKind, Rule};
use barite_types::{EventBody, InboundEvent, ItemId, ItemKind};

use crate::limiter::{build_limiter, delete_limiter_state, RateLimiter};
use crate::ports::{render_with_budget, MatcherSpec, Predicate, RenderContext};
use crate::{Registry, RegistryError, RegistryResult};

impl Registry {
    /// Validates and persists a rule, then registers its matcher if the
    /// rule is active. Validation failures leave the store untouched.
    pub fn create_rule(&self, parent: ItemId, mut rule: Rule) -> RegistryResult<ItemId> {
        self.validate_rule(&rule)?;
        if !self.inner.groups.lock().unwrap().contains_key(&parent) {
            return Err(RegistryError::NotFound(format!("group {parent}")));
        }
        rule.parent_group = parent;

        let id = self.inner.ids.next()?;
        self.inner.rule_store.put(id, &rule)?;
        self.attach_item(parent, ItemKind::Rule, id, &rule.display_name)?;

        if rule.active {
            if let Err(err) = self.register_rule(id, &rule) {
                // registration is the last step; roll the record back so a
                // stored active rule always has a live matcher
                let _ = self.inner.rule_store.delete(id);
                let _ = self.detach_item(parent, ItemKind::Rule, id);
                return Err(err);
            }
        }
        self.inner.rules.lock().unwrap().insert(id, rule);
        info!(id, "rule created");
        Ok(id)
    }

    pub fn get_rule(&self, id: ItemId) -> Option<Rule> {
        self.inner.rules.lock().unwrap().get(&id).cloned()
    }

    pub fn list_rules(&self) -> Vec<(ItemId, Rule)> {
        let mut out: Vec<_> = self
            .inner
            .rules
            .lock()
            .unwrap()
            .iter()
            .map(|(id, r)| (*id, r.clone()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    /// Replaces a rule's definition. The parent group is not changed here;
    /// use [`Registry::move_item`] for that.
    pub fn update_rule(&self, id: ItemId, mut rule: Rule) -> RegistryResult<()> {
        self.validate_rule(&rule)?;
        let old = self
            .get_rule(id)
            .ok_or_else(|| RegistryError::NotFound(format!("rule {id}")))?;
        rule.parent_group = old.parent_group;

        // old matcher comes down before the new one goes up
        if old.active {
            self.unregister_rule(id)?;
        }
        if rule.active {
            if let Err(err) = self.register_rule(id, &rule) {
                if old.active {
                    if let Err(restore) = self.register_rule(id, &old) {
                        warn!(id, %restore, "failed to restore previous matcher");
                    }
                }
                return Err(err);
            }
        }

        self.inner.rule_store.put(id, &rule)?;
        self.sync_item_name(rule.parent_group, ItemKind::Rule, id, &rule.display_name)?;
        self.inner.rules.lock().unwrap().insert(id, rule);
        Ok(())
    }

    /// Deletes a rule, its live matcher, and its persisted limiter state.
    pub fn delete_rule(&self, id: ItemId) -> RegistryResult<()> {
        let rule = self
            .get_rule(id)
            .ok_or_else(|| RegistryError::NotFound(format!("rule {id}")))?;

        let handle = self.inner.rule_handles.lock().unwrap().remove(&id);
        match handle {
            Some(handle) => {
                if let Err(err) = self.inner.ports.dispatcher.unregister(handle) {
                    warn!(id, %err, "matcher unregister failed during delete");
                }
            }
            None if rule.active => {
                warn!(id, "active rule had no live matcher at delete");
            }
            None => {}
        }

        delete_limiter_state(&self.inner.kv, id);
        self.inner.rule_store.delete(id)?;
        self.detach_item(rule.parent_group, ItemKind::Rule, id)?;
        self.inner.rules.lock().unwrap().remove(&id);
        info!(id, "rule deleted");
        Ok(())
    }

    fn validate_rule(&self, rule: &Rule) -> RegistryResult<()> {
        if rule.patterns.is_empty() {
            return Err(RegistryError::Validation(
                "a rule needs at least one pattern".to_string(),
            ));
        }
        if rule.matcher_kind == MatcherKind::Regex {
            // regex rules carry exactly one pattern; alternation belongs
            // inside the expression
            if rule.patterns.len() != 1 {
                return Err(RegistryError::Validation(
                    "a regex rule carries exactly one pattern".to_string(),
                ));
            }
            Regex::new(&rule.patterns[0])
                .map_err(|err| RegistryError::Validation(format!("bad regex: {err}")))?;
        }
        self.inner
            .ports
            .renderer
            .check(&rule.response_template)
            .map_err(|err| RegistryError::Validation(format!("bad template: {err}")))?;
        Ok(())
    }

    /// Compiles and installs the matcher for one rule, recording its
    /// handle. The predicate captures an immutable snapshot of the rule,
    /// so dispatch never takes a registry lock.
    pub(crate) fn register_rule(&self, id: ItemId, rule: &Rule) -> RegistryResult<()> {
        let base = compile_rule_predicate(rule, &self.inner.command_prefixes)?;
        // a rejected admission means "no match": lower-priority matchers
        // still get their turn
        let predicate: Predicate = match &rule.rate_limit {
            Some(spec) => {
                let limiter: Arc<dyn RateLimiter> =
                    Arc::from(build_limiter(&self.inner.kv, id, spec));
                Arc::new(move |event: &InboundEvent| base(event) && limiter.require())
            }
            None => base,
        };

        let renderer = Arc::clone(&self.inner.ports.renderer);
        let sender = Arc::clone(&self.inner.ports.sender);
        let template = rule.response_template.clone();
        let budget = self.inner.render_budget;
        let handler = Arc::new(move |event: &InboundEvent| {
            let context = RenderContext {
                event: Some(event.raw.clone()),
            };
            match render_with_budget(&renderer, &template, context, budget) {
                Ok(text) => {
                    // whitespace-only output means "no reply"
                    let text = text.trim();
                    if !text.is_empty() {
                        sender.send(event.reply_target(), text);
                    }
                }
                Err(err) => warn!(rule = id, %err, "response render failed"),
            }
        });

        let handle = self
            .inner
            .ports
            .dispatcher
            .register(MatcherSpec {
                predicate,
                priority: rule.priority,
                block_following: rule.block_following,
                handler,
            })
            .map_err(|err| RegistryError::Dispatch(err.to_string()))?;
        self.inner.rule_handles.lock().unwrap().insert(id, handle);
        Ok(())
    }

    /// Takes down the live matcher for one rule. A missing handle means the
    /// registry and dispatcher have drifted; the caller's operation aborts
    /// rather than risk a duplicate live matcher later.
    pub(crate) fn unregister_rule(&self, id: ItemId) -> RegistryResult<()> {
        let handle = self
            .inner
            .rule_handles
            .lock()
            .unwrap()
            .remove(&id)
            .ok_or_else(|| RegistryError::Integrity(format!("rule {id} has no live matcher")))?;
        self.inner
            .ports
            .dispatcher
            .unregister(handle)
            .map_err(|err| RegistryError::Dispatch(err.to_string()))
    }
}

/// Builds the event predicate for one rule.
fn compile_rule_predicate(rule: &Rule, command_prefixes: &[String]) -> RegistryResult<Predicate> {
    let matcher = TextMatcher::compile(rule, command_prefixes)?;
    let mask = rule.message_types;
    let group_filter = rule.group_filter.clone();
    let user_filter = rule.user_filter.clone();
    let only_when_addressed = rule.only_when_addressed;

    Ok(Arc::new(move |event: &InboundEvent| {
        let EventBody::Message {
            class,
            text,
            addressed,
        } = &event.body
        else {
            return false;
        };
        if !mask.accepts(*class) {
            return false;
        }
        if only_when_addressed && !addressed {
            return false;
        }
        if !group_filter.is_empty() && !group_filter.contains(&event.group_id) {
            return false;
        }
        if !user_filter.is_empty() && !user_filter.contains(&event.user_id) {
            return false;
        }
        matcher.matches(text)
    }))
}

/// Pattern matching precompiled at registration time.
enum TextMatcher {
    FullMatch(Vec<String>),
    Keyword(Vec<String>),
    Prefix(Vec<String>),
    Suffix(Vec<String>),
    /// Command words paired with the configured command prefixes.
    Command {
        prefixes: Vec<String>,
        words: Vec<String>,
    },
    Regex(Regex),
}

impl TextMatcher {
    fn compile(rule: &Rule, command_prefixes: &[String]) -> RegistryResult<Self> {
        let patterns = rule.patterns.clone();
        Ok(match rule.matcher_kind {
            MatcherKind::FullMatch => Self::FullMatch(patterns),
            MatcherKind::Keyword => Self::Keyword(patterns),
            MatcherKind::Prefix => Self::Prefix(patterns),
            MatcherKind::Suffix => Self::Suffix(patterns),
            MatcherKind::Command => Self::Command {
                prefixes: command_prefixes.to_vec(),
                words: patterns,
            },
            MatcherKind::Regex => {
                let [pattern] = patterns.as_slice() else {
                    return Err(RegistryError::Validation(
                        "a regex rule carries exactly one pattern".to_string(),
                    ));
                };
                Self::Regex(
                    Regex::new(pattern)
                        .map_err(|err| RegistryError::Validation(format!("bad regex: {err}")))?,
                )
            }
        })
    }

    fn matches(&self, text: &str) -> bool {
        match self {
            Self::FullMatch(patterns) => patterns.iter().any(|p| text == p),
            Self::Keyword(patterns) => patterns.iter().any(|p| text.contains(p.as_str())),
            Self::Prefix(patterns) => patterns.iter().any(|p| text.starts_with(p.as_str())),
            Self::Suffix(patterns) => patterns.iter().any(|p| text.ends_with(p.as_str())),
            Self::Command { prefixes, words } => prefixes.iter().any(|prefix| {
                words.iter().any(|word| {
                    text.strip_prefix(prefix.as_str())
                        .and_then(|rest| rest.strip_prefix(word.as_str()))
                        .is_some_and(|tail| {
                            tail.is_empty() || tail.starts_with(char::is_whitespace)
                        })
                })
            }),
            Self::Regex(re) => re.is_match(text),
        }
    }
}
