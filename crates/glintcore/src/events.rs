//! NPC reactive events.
//!
//! World logic calls [`notify`] against a specific NPC when a domain event
//! happens (someone enters the room, speaks, hands over an item). Each of
//! the NPC's bindings under that trigger resolves its script, rolls against
//! its probability, and on a hit feeds the script's command lines into the
//! NPC's queue, subscribing it to the tick loop.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::npc::NpcId;
use crate::world::World;

/// Trigger names an event binding may register under.
pub const TRIGGERS: &[&str] = &["on_enter", "listen_for", "given_item"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    Probability(i64),
    UnknownTrigger(String),
}

impl std::fmt::Display for BindingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingError::Probability(p) => {
                write!(f, "Probability value must be between 1 and 100 (got {p}).")
            }
            BindingError::UnknownTrigger(t) => {
                write!(f, "\"{t}\" is not a valid event trigger.")
            }
        }
    }
}

impl std::error::Error for BindingError {}

/// Reference to a script by `(area, id)`, resolved through the world at
/// fire time. Resolution failure is the NPC's problem, not the caller's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRef {
    pub area: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBinding {
    pub trigger: String,
    pub condition: Option<String>,
    pub script: ScriptRef,
    pub probability: u8,
}

impl EventBinding {
    /// Validated constructor: unknown triggers and probabilities outside
    /// `[1, 100]` are rejected here, at binding-creation time.
    pub fn new(
        trigger: &str,
        condition: Option<String>,
        script: ScriptRef,
        probability: i64,
    ) -> Result<Self, BindingError> {
        let trigger = trigger.trim().to_ascii_lowercase();
        if !TRIGGERS.contains(&trigger.as_str()) {
            return Err(BindingError::UnknownTrigger(trigger));
        }
        if !(1..=100).contains(&probability) {
            return Err(BindingError::Probability(probability));
        }
        Ok(Self {
            trigger,
            condition,
            script,
            probability: probability as u8,
        })
    }
}

/// All of one NPC template's bindings, keyed by trigger. Instances hold a
/// snapshot of this table taken at spawn time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventTable {
    by_trigger: BTreeMap<String, Vec<EventBinding>>,
}

impl EventTable {
    pub fn add(&mut self, binding: EventBinding) {
        self.by_trigger
            .entry(binding.trigger.clone())
            .or_default()
            .push(binding);
    }

    pub fn remove(&mut self, trigger: &str, index: usize) -> Option<EventBinding> {
        let list = self.by_trigger.get_mut(trigger)?;
        if index >= list.len() {
            return None;
        }
        let removed = list.remove(index);
        if list.is_empty() {
            self.by_trigger.remove(trigger);
        }
        Some(removed)
    }

    pub fn bindings(&self, trigger: &str) -> &[EventBinding] {
        self.by_trigger
            .get(trigger)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_trigger.is_empty()
    }

    pub fn describe(&self) -> String {
        if self.by_trigger.is_empty() {
            return "None.\n".to_string();
        }
        let mut s = String::new();
        for (trigger, list) in &self.by_trigger {
            s.push_str(&format!("  {trigger}:\n"));
            for (i, b) in list.iter().enumerate() {
                let cond = b
                    .condition
                    .as_deref()
                    .map(|c| format!(" '{c}'"))
                    .unwrap_or_default();
                s.push_str(&format!(
                    "    [{i}]{cond} call script {}:{} ({}%)\n",
                    b.script.area, b.script.id, b.probability
                ));
            }
        }
        s
    }
}

/// Event context: plain string key/values merged from the caller, the
/// binding, and the notified NPC.
pub type EventCtx = BTreeMap<String, String>;

/// Substitute `$key` tokens in a script line from the context.
fn substitute(line: &str, ctx: &EventCtx) -> String {
    let mut out = line.to_string();
    for (k, v) in ctx {
        out = out.replace(&format!("${k}"), v);
    }
    out
}

/// Fire `trigger` against one NPC. Every binding under the trigger is
/// attempted independently: unresolved scripts log a diagnostic to the
/// NPC's own output, resolved ones roll 1..=100 against their probability.
/// The NPC is (re-)subscribed afterwards so queued commands get ticks.
pub fn notify(world: &mut World, npc_id: NpcId, trigger: &str, ctx: &EventCtx) {
    let Some(npc) = world.npc(npc_id) else {
        return;
    };
    let table = npc.events.clone();
    let bindings = table.bindings(trigger);
    if bindings.is_empty() {
        return;
    }
    let npc_name = npc.name.clone();

    for binding in bindings {
        // listen_for conditions gate on the heard text.
        if trigger == "listen_for" {
            if let Some(cond) = &binding.condition {
                let heard = ctx.get("text").map(String::as_str).unwrap_or("");
                if !heard.to_ascii_lowercase().contains(&cond.to_ascii_lowercase()) {
                    continue;
                }
            }
        }

        let body = world
            .area(&binding.script.area)
            .and_then(|a| a.get_script(&binding.script.id))
            .map(|s| s.body.clone());
        let Some(body) = body else {
            let msg = format!(
                "Cannot resolve script {}:{} for {} event.",
                binding.script.area, binding.script.id, trigger
            );
            if let Some(npc) = world.npc_mut(npc_id) {
                npc.update_output(msg);
            }
            continue;
        };

        if world.roll(1, 100) > binding.probability as i32 {
            continue;
        }

        let mut merged = ctx.clone();
        if let Some(cond) = &binding.condition {
            merged.insert("condition".to_string(), cond.clone());
        }
        merged.insert("actor".to_string(), npc_name.clone());

        for line in body.lines() {
            let line = substitute(line, &merged);
            if !line.trim().is_empty() {
                world.npc_perform(npc_id, &line);
            }
        }
    }

    world.npc_subscribe(npc_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script_ref() -> ScriptRef {
        ScriptRef {
            area: "moor".to_string(),
            id: "1".to_string(),
        }
    }

    #[test]
    fn probability_bounds_are_enforced() {
        assert!(matches!(
            EventBinding::new("on_enter", None, script_ref(), 0),
            Err(BindingError::Probability(0))
        ));
        assert!(matches!(
            EventBinding::new("on_enter", None, script_ref(), 101),
            Err(BindingError::Probability(101))
        ));
        assert!(EventBinding::new("on_enter", None, script_ref(), 1).is_ok());
        assert!(EventBinding::new("on_enter", None, script_ref(), 100).is_ok());
    }

    #[test]
    fn unknown_trigger_is_rejected() {
        let err = EventBinding::new("on_sneeze", None, script_ref(), 50).unwrap_err();
        assert_eq!(err, BindingError::UnknownTrigger("on_sneeze".to_string()));
    }

    #[test]
    fn table_add_remove_round_trip() {
        let mut t = EventTable::default();
        t.add(EventBinding::new("on_enter", None, script_ref(), 100).unwrap());
        t.add(EventBinding::new("on_enter", None, script_ref(), 50).unwrap());
        assert_eq!(t.bindings("on_enter").len(), 2);

        assert!(t.remove("on_enter", 5).is_none());
        let removed = t.remove("on_enter", 0).unwrap();
        assert_eq!(removed.probability, 100);
        assert_eq!(t.bindings("on_enter").len(), 1);

        t.remove("on_enter", 0);
        assert!(t.is_empty());
    }

    #[test]
    fn substitute_replaces_context_tokens() {
        let mut ctx = EventCtx::new();
        ctx.insert("triggerer".to_string(), "alice".to_string());
        assert_eq!(
            substitute("say hello, $triggerer!", &ctx),
            "say hello, alice!"
        );
    }
}
