//! Schedule resolution algorithm (spec.md §4.5).

use crate::criteria::evaluate_all;
use crate::types::{PlannedPlay, ScheduleItem, ScheduleItemKind, ScheduleModel};
use chrono::{DateTime, Datelike, Utc};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// A layout expanded from a standalone item or a campaign, carrying the
/// priority/schedule id/duration/share-of-voice it needs for interrupt
/// handling (spec.md §4.5, step 3).
#[derive(Debug, Clone, Copy)]
struct PlayableItem {
    schedule_id: u64,
    layout_id: u64,
    priority: i32,
    share_of_voice: Option<u8>,
    duration_secs: Option<f64>,
}

/// Resolves a [`ScheduleModel`] into the play sequence for "now", holding
/// the two pieces of per-hour state spec.md §3/§4.5 call out: interrupt
/// committed-duration tallies and per-item play counters. Single-writer,
/// single-reader (spec.md §5) — callers do not need to synchronize it
/// themselves beyond holding `&mut self` across a query.
#[derive(Debug, Default)]
pub struct ScheduleResolver {
    interrupt_committed: HashMap<u64, f64>,
    play_counts: HashMap<u64, u32>,
    hour_bucket: Option<i64>,
}

impl ScheduleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// `current_layouts(now, geo, props)` (spec.md §4.5).
    #[instrument(skip(self, model, display_props))]
    pub fn current_layouts(
        &mut self,
        model: &ScheduleModel,
        now: DateTime<Utc>,
        geo: Option<(f64, f64)>,
        display_props: &HashMap<String, String>,
    ) -> Vec<PlannedPlay> {
        self.reset_on_hour_rollover(now);

        let active: Vec<&ScheduleItem> = model
            .items
            .iter()
            .filter(|item| self.is_active(item, now, geo, display_props))
            .collect();

        if active.is_empty() {
            debug!("no active items; falling back to default layout");
            return if model.default_layout_id != 0 {
                vec![PlannedPlay {
                    schedule_id: 0,
                    layout_id: model.default_layout_id,
                }]
            } else {
                Vec::new()
            };
        }

        let max_priority = active.iter().map(|i| i.priority).max().unwrap_or(i32::MIN);
        let surviving: Vec<&ScheduleItem> = active.into_iter().filter(|i| i.priority == max_priority).collect();

        for item in &surviving {
            *self.play_counts.entry(item.schedule_id).or_insert(0) += 1;
        }

        let expanded = Self::expand_campaigns(&surviving);
        let (normal, interrupt): (Vec<_>, Vec<_>) =
            expanded.into_iter().partition(|p| !p.share_of_voice.is_some_and(|s| s > 0));

        if interrupt.is_empty() {
            return normal
                .into_iter()
                .map(|p| PlannedPlay {
                    schedule_id: p.schedule_id,
                    layout_id: p.layout_id,
                })
                .collect();
        }

        self.interleave(&normal, &interrupt)
    }

    /// Overlays follow the same active-item rules but are never folded
    /// into the main sequence (spec.md §4.5, "Overlays").
    #[instrument(skip(self, model, display_props))]
    pub fn current_overlays(
        &self,
        model: &ScheduleModel,
        now: DateTime<Utc>,
        geo: Option<(f64, f64)>,
        display_props: &HashMap<String, String>,
    ) -> Vec<PlannedPlay> {
        model
            .overlays
            .iter()
            .filter(|item| self.is_active(item, now, geo, display_props))
            .flat_map(|item| match &item.kind {
                ScheduleItemKind::Layout(id) => vec![PlannedPlay {
                    schedule_id: item.schedule_id,
                    layout_id: *id,
                }],
                ScheduleItemKind::Campaign(ids) => ids
                    .iter()
                    .map(|id| PlannedPlay {
                        schedule_id: item.schedule_id,
                        layout_id: *id,
                    })
                    .collect(),
            })
            .collect()
    }

    fn is_active(
        &self,
        item: &ScheduleItem,
        now: DateTime<Utc>,
        geo: Option<(f64, f64)>,
        display_props: &HashMap<String, String>,
    ) -> bool {
        if let Some(recurrence) = &item.recurrence {
            if let Some(range) = recurrence.range
                && now > range
            {
                return false;
            }
            let iso_day = now.weekday().number_from_monday();
            if !recurrence.includes_day(iso_day) {
                return false;
            }
            let (start, end) = item.time_of_day_bounds();
            let now_time = now.time();
            let in_window = if start <= end {
                now_time >= start && now_time < end
            } else {
                now_time >= start || now_time < end
            };
            if !in_window {
                return false;
            }
        } else if now < item.from_dt || now > item.to_dt {
            return false;
        }

        if !evaluate_all(&item.criteria, now, display_props) {
            return false;
        }

        if item.is_geo_aware
            && let Some(fence) = item.geo_fence()
        {
            match geo {
                Some((lat, lon)) if fence.contains(lat, lon) => {}
                _ => return false,
            }
        }

        if let Some(cap) = item.max_plays_per_hour
            && cap > 0
            && self.play_counts.get(&item.schedule_id).copied().unwrap_or(0) >= cap
        {
            return false;
        }

        true
    }

    fn expand_campaigns(items: &[&ScheduleItem]) -> Vec<PlayableItem> {
        items
            .iter()
            .flat_map(|item| match &item.kind {
                ScheduleItemKind::Layout(id) => vec![PlayableItem {
                    schedule_id: item.schedule_id,
                    layout_id: *id,
                    priority: item.priority,
                    share_of_voice: item.share_of_voice,
                    duration_secs: item.duration_secs,
                }],
                ScheduleItemKind::Campaign(ids) => ids
                    .iter()
                    .map(|id| PlayableItem {
                        schedule_id: item.schedule_id,
                        layout_id: *id,
                        priority: item.priority,
                        share_of_voice: item.share_of_voice,
                        duration_secs: item.duration_secs,
                    })
                    .collect(),
            })
            .collect()
    }

    /// Share-of-voice interleaving (spec.md §4.5, step 4).
    fn interleave(&mut self, normal: &[PlayableItem], interrupt: &[PlayableItem]) -> Vec<PlannedPlay> {
        const HOUR_SECS: f64 = 3600.0;

        let required: HashMap<u64, f64> = interrupt
            .iter()
            .map(|i| (i.schedule_id, f64::from(i.share_of_voice.unwrap_or(0)) / 100.0 * HOUR_SECS))
            .collect();

        let mut interrupt_plays = Vec::new();
        let mut total_interrupt_secs = 0.0;
        let mut idx = 0;
        let max_iterations = interrupt.len() * 10_000 + 1;
        let mut iterations = 0;
        while iterations < max_iterations {
            iterations += 1;
            let all_satisfied = interrupt.iter().all(|i| {
                let need = required.get(&i.schedule_id).copied().unwrap_or(0.0);
                self.interrupt_committed.get(&i.schedule_id).copied().unwrap_or(0.0) >= need
            });
            if all_satisfied || interrupt.is_empty() {
                break;
            }
            let item = interrupt[idx % interrupt.len()];
            let need = required.get(&item.schedule_id).copied().unwrap_or(0.0);
            let committed = self.interrupt_committed.entry(item.schedule_id).or_insert(0.0);
            if *committed < need {
                let duration = item.duration_secs.unwrap_or(0.0);
                *committed += duration;
                total_interrupt_secs += duration;
                interrupt_plays.push(item);
            }
            idx += 1;
        }

        let interrupt_seq: Vec<PlannedPlay> = interrupt_plays
            .iter()
            .map(|p| PlannedPlay {
                schedule_id: p.schedule_id,
                layout_id: p.layout_id,
            })
            .collect();

        if total_interrupt_secs >= HOUR_SECS || normal.is_empty() {
            return interrupt_seq;
        }

        let remaining_secs = HOUR_SECS - total_interrupt_secs;
        let mut normal_plays = Vec::new();
        let mut normal_secs = 0.0;
        let mut n_idx = 0;
        while normal_secs < remaining_secs {
            let item = normal[n_idx % normal.len()];
            normal_plays.push(item);
            normal_secs += item.duration_secs.unwrap_or(1.0).max(1.0);
            n_idx += 1;
            if n_idx > normal.len() * 100_000 {
                break;
            }
        }

        Self::interleave_sequences(&normal_plays, &interrupt_plays)
    }

    /// Evenly distributes `interrupt` plays among `normal` plays, `k =
    /// max(|normal|, |interrupt|)` slots, per spec.md §4.5 step 4's
    /// interleave rule.
    fn interleave_sequences(normal: &[PlayableItem], interrupt: &[PlayableItem]) -> Vec<PlannedPlay> {
        let k = normal.len().max(interrupt.len()).max(1);
        let normal_stride = if normal.is_empty() { 0 } else { k.div_ceil(normal.len()) };
        let interrupt_stride = if interrupt.is_empty() { 0 } else { k / interrupt.len() };

        let mut out = Vec::with_capacity(normal.len() + interrupt.len());
        let (mut n_idx, mut i_idx) = (0usize, 0usize);
        for slot in 0..k {
            let take_normal = normal_stride != 0 && slot % normal_stride == 0 && n_idx < normal.len();
            let take_interrupt = interrupt_stride != 0 && slot % interrupt_stride == 0 && i_idx < interrupt.len();
            if take_interrupt {
                let item = interrupt[i_idx];
                out.push(PlannedPlay {
                    schedule_id: item.schedule_id,
                    layout_id: item.layout_id,
                });
                i_idx += 1;
            }
            if take_normal {
                let item = normal[n_idx];
                out.push(PlannedPlay {
                    schedule_id: item.schedule_id,
                    layout_id: item.layout_id,
                });
                n_idx += 1;
            }
        }
        // Top up anything the stride math left behind.
        for item in &normal[n_idx..] {
            out.push(PlannedPlay {
                schedule_id: item.schedule_id,
                layout_id: item.layout_id,
            });
        }
        for item in &interrupt[i_idx..] {
            out.push(PlannedPlay {
                schedule_id: item.schedule_id,
                layout_id: item.layout_id,
            });
        }
        out
    }

    /// Interrupt tallies and play counters reset lazily on the first query
    /// after an hour rollover (spec.md §4.5, "Per-hour resets").
    fn reset_on_hour_rollover(&mut self, now: DateTime<Utc>) {
        let bucket = now.timestamp().div_euclid(3600);
        if self.hour_bucket != Some(bucket) {
            self.interrupt_committed.clear();
            self.play_counts.clear();
            self.hour_bucket = Some(bucket);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Recurrence;
    use crate::types::RecurrenceType;

    fn dt(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn layout_item(schedule_id: u64, layout_id: u64, priority: i32) -> ScheduleItem {
        ScheduleItem {
            schedule_id,
            from_dt: dt("2020-01-01T00:00:00Z"),
            to_dt: dt("2030-01-01T00:00:00Z"),
            priority,
            recurrence: None,
            share_of_voice: None,
            max_plays_per_hour: None,
            is_geo_aware: false,
            geo_location: None,
            criteria: Vec::new(),
            duration_secs: Some(10.0),
            kind: ScheduleItemKind::Layout(layout_id),
        }
    }

    #[test]
    fn priority_pruning_discards_lower_priority_items() {
        let mut resolver = ScheduleResolver::new();
        let model = ScheduleModel {
            default_layout_id: 0,
            items: vec![layout_item(1, 10, 10), layout_item(2, 20, 5)],
            overlays: Vec::new(),
        };
        let now = dt("2026-07-26T12:00:00Z");
        let result = resolver.current_layouts(&model, now, None, &HashMap::new());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].layout_id, 10);
    }

    #[test]
    fn ties_keep_all_items() {
        let mut resolver = ScheduleResolver::new();
        let model = ScheduleModel {
            default_layout_id: 0,
            items: vec![layout_item(1, 10, 10), layout_item(2, 20, 10)],
            overlays: Vec::new(),
        };
        let now = dt("2026-07-26T12:00:00Z");
        let result = resolver.current_layouts(&model, now, None, &HashMap::new());
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn campaign_expands_into_its_layout_sequence() {
        let mut resolver = ScheduleResolver::new();
        let mut item = layout_item(1, 0, 10);
        item.kind = ScheduleItemKind::Campaign(vec![1, 2, 3]);
        let model = ScheduleModel {
            default_layout_id: 0,
            items: vec![item],
            overlays: Vec::new(),
        };
        let now = dt("2026-07-26T12:00:00Z");
        let result = resolver.current_layouts(&model, now, None, &HashMap::new());
        let ids: Vec<u64> = result.iter().map(|p| p.layout_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn empty_active_set_falls_back_to_default_layout() {
        let mut resolver = ScheduleResolver::new();
        let model = ScheduleModel {
            default_layout_id: 99,
            items: Vec::new(),
            overlays: Vec::new(),
        };
        let now = dt("2026-07-26T12:00:00Z");
        let result = resolver.current_layouts(&model, now, None, &HashMap::new());
        assert_eq!(result, vec![PlannedPlay { schedule_id: 0, layout_id: 99 }]);
    }

    #[test]
    fn empty_active_set_with_zero_default_is_empty() {
        let mut resolver = ScheduleResolver::new();
        let model = ScheduleModel {
            default_layout_id: 0,
            items: Vec::new(),
            overlays: Vec::new(),
        };
        let now = dt("2026-07-26T12:00:00Z");
        assert!(resolver.current_layouts(&model, now, None, &HashMap::new()).is_empty());
    }

    #[test]
    fn overnight_dayparting_wraps_past_midnight() {
        let mut item = layout_item(1, 10, 10);
        item.recurrence = Some(Recurrence {
            kind: RecurrenceType::Week,
            detail_bitset: 0b0111_1111,
            range: None,
        });
        item.from_dt = dt("2000-01-01T22:00:00Z");
        item.to_dt = dt("2000-01-01T06:00:00Z");
        let model = ScheduleModel {
            default_layout_id: 0,
            items: vec![item],
            overlays: Vec::new(),
        };

        let mut resolver = ScheduleResolver::new();
        let active_at_2330 = dt("2026-07-28T23:30:00Z"); // Tuesday
        assert_eq!(resolver.current_layouts(&model, active_at_2330, None, &HashMap::new()).len(), 1);

        let mut resolver2 = ScheduleResolver::new();
        let inactive_at_0630 = dt("2026-07-28T06:30:00Z");
        assert!(resolver2.current_layouts(&model, inactive_at_0630, None, &HashMap::new()).is_empty());
    }

    #[test]
    fn recurrence_day_bitset_excludes_weekend() {
        let mut item = layout_item(1, 10, 10);
        item.recurrence = Some(Recurrence {
            kind: RecurrenceType::Week,
            detail_bitset: 0b0001_1111, // Mon-Fri
            range: None,
        });
        item.from_dt = dt("2000-01-01T22:00:00Z");
        item.to_dt = dt("2000-01-01T06:00:00Z");
        let model = ScheduleModel {
            default_layout_id: 0,
            items: vec![item],
            overlays: Vec::new(),
        };
        let mut resolver = ScheduleResolver::new();
        let saturday_night = dt("2026-08-01T23:30:00Z"); // Saturday
        assert!(resolver.current_layouts(&model, saturday_night, None, &HashMap::new()).is_empty());
    }

    #[test]
    fn max_plays_per_hour_caps_occurrences_within_the_hour() {
        let mut item = layout_item(1, 10, 10);
        item.max_plays_per_hour = Some(2);
        let model = ScheduleModel {
            default_layout_id: 0,
            items: vec![item],
            overlays: Vec::new(),
        };
        let mut resolver = ScheduleResolver::new();
        let t0 = dt("2026-07-26T12:00:00Z");
        let t1 = dt("2026-07-26T12:01:00Z");
        let t2 = dt("2026-07-26T12:02:00Z");
        assert_eq!(resolver.current_layouts(&model, t0, None, &HashMap::new()).len(), 1);
        assert_eq!(resolver.current_layouts(&model, t1, None, &HashMap::new()).len(), 1);
        assert!(resolver.current_layouts(&model, t2, None, &HashMap::new()).is_empty());
    }

    #[test]
    fn hour_rollover_resets_play_counter() {
        let mut item = layout_item(1, 10, 10);
        item.max_plays_per_hour = Some(1);
        let model = ScheduleModel {
            default_layout_id: 0,
            items: vec![item],
            overlays: Vec::new(),
        };
        let mut resolver = ScheduleResolver::new();
        let t0 = dt("2026-07-26T12:59:00Z");
        let t1 = dt("2026-07-26T13:00:00Z");
        assert_eq!(resolver.current_layouts(&model, t0, None, &HashMap::new()).len(), 1);
        assert_eq!(resolver.current_layouts(&model, t1, None, &HashMap::new()).len(), 1);
    }

    #[test]
    fn geo_fence_excludes_out_of_range_display() {
        let mut item = layout_item(1, 10, 10);
        item.is_geo_aware = true;
        item.geo_location = Some("10.0,20.0,100".to_string());
        let model = ScheduleModel {
            default_layout_id: 0,
            items: vec![item],
            overlays: Vec::new(),
        };
        let mut resolver = ScheduleResolver::new();
        let now = dt("2026-07-26T12:00:00Z");
        assert!(resolver.current_layouts(&model, now, Some((50.0, 50.0)), &HashMap::new()).is_empty());
        assert_eq!(resolver.current_layouts(&model, now, Some((10.0, 20.0)), &HashMap::new()).len(), 1);
    }

    #[test]
    fn interrupt_share_of_voice_is_honoured_across_the_hour() {
        let mut normal = layout_item(1, 1, 10);
        normal.duration_secs = Some(30.0);
        let mut interrupt = layout_item(2, 2, 10);
        interrupt.share_of_voice = Some(20);
        interrupt.duration_secs = Some(60.0);

        let model = ScheduleModel {
            default_layout_id: 0,
            items: vec![normal, interrupt],
            overlays: Vec::new(),
        };
        let mut resolver = ScheduleResolver::new();
        let now = dt("2026-07-26T12:00:00Z");
        let result = resolver.current_layouts(&model, now, None, &HashMap::new());

        let interrupt_secs: f64 = result.iter().filter(|p| p.layout_id == 2).count() as f64 * 60.0;
        assert!(interrupt_secs >= 0.20 * 3600.0);
        assert!(result.iter().any(|p| p.layout_id == 1));
    }

    #[test]
    fn overlays_never_appear_in_the_main_sequence() {
        let overlay = layout_item(9, 77, 1);
        let model = ScheduleModel {
            default_layout_id: 0,
            items: vec![layout_item(1, 10, 10)],
            overlays: vec![overlay],
        };
        let mut resolver = ScheduleResolver::new();
        let now = dt("2026-07-26T12:00:00Z");
        let layouts = resolver.current_layouts(&model, now, None, &HashMap::new());
        let overlays = resolver.current_overlays(&model, now, None, &HashMap::new());
        assert!(!layouts.iter().any(|p| p.layout_id == 77));
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].layout_id, 77);
    }
}
