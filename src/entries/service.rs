use time::{Date, OffsetDateTime};

use crate::entries::repo::Entry;
use crate::error::ApiError;
use crate::users::repo::WritingProfile;

/// Count whitespace-delimited word tokens.
pub fn count_words(words: &str) -> i32 {
    words.split_whitespace().count() as i32
}

/// Fields computed for a brand-new entry. The timezone and milestone target
/// are snapshots of the author's profile at creation time and never
/// re-derived afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub entry_timezone: String,
    pub word_count: i32,
    pub start_time: OffsetDateTime,
    pub finish_time: OffsetDateTime,
    pub milestone_word_count: i32,
    pub milestone_time: Option<OffsetDateTime>,
}

/// Fields recomputed on every update. Immutable fields never appear here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryChanges {
    pub word_count: i32,
    pub finish_time: OffsetDateTime,
    pub milestone_time: Option<OffsetDateTime>,
}

/// Validate and compute a new entry.
///
/// "Today" is always evaluated in UTC; the profile timezone is stored for
/// display only. The milestone is reached when the word count meets or
/// exceeds the target, and start_time is server-set to the first write.
pub fn prepare_create(
    entry_date: Date,
    words: &str,
    profile: &WritingProfile,
    now: OffsetDateTime,
) -> Result<NewEntry, ApiError> {
    verify_entry_for_today(entry_date, now)?;

    let word_count = count_words(words);
    let finish_time = now;
    let milestone_time =
        (word_count >= profile.target_milestone_word_count).then_some(finish_time);

    Ok(NewEntry {
        entry_timezone: profile.timezone.clone(),
        word_count,
        start_time: finish_time,
        finish_time,
        milestone_word_count: profile.target_milestone_word_count,
        milestone_time,
    })
}

/// Validate and compute an update to an existing entry.
///
/// entry_date and start_time are immutable; the entry itself is frozen once
/// its date is no longer today (UTC). milestone_time is set exactly once, the
/// first time the snapshot target is reached, and then never moves.
pub fn prepare_update(
    existing: &Entry,
    entry_date: Option<Date>,
    start_time: Option<OffsetDateTime>,
    words: &str,
    now: OffsetDateTime,
) -> Result<EntryChanges, ApiError> {
    if let Some(date) = entry_date {
        if date != existing.entry_date {
            return Err(ApiError::business(
                "entry_date",
                "Entry date may not be modified",
                "invalid",
            ));
        }
    }
    verify_entry_for_today(existing.entry_date, now)?;

    if let Some(start) = start_time {
        if start != existing.start_time {
            return Err(ApiError::business(
                "start_time",
                "Start time may not be modified",
                "invalid",
            ));
        }
    }

    let word_count = count_words(words);
    let finish_time = now;
    let milestone_time = existing.milestone_time.or_else(|| {
        (word_count >= existing.milestone_word_count).then_some(finish_time)
    });

    Ok(EntryChanges {
        word_count,
        finish_time,
        milestone_time,
    })
}

fn verify_entry_for_today(entry_date: Date, now: OffsetDateTime) -> Result<(), ApiError> {
    if entry_date != now.date() {
        return Err(ApiError::business(
            "entry_date",
            "Entry date must be today's date (UTC)",
            "invalid",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod service_tests {
    use super::*;
    use time::macros::{date, datetime};
    use uuid::Uuid;

    fn profile(target: i32) -> WritingProfile {
        WritingProfile {
            user_id: Uuid::new_v4(),
            timezone: "Australia/Sydney".into(),
            target_milestone_word_count: target,
        }
    }

    fn existing_entry(
        entry_date: Date,
        milestone_word_count: i32,
        milestone_time: Option<OffsetDateTime>,
    ) -> Entry {
        Entry {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            entry_date,
            entry_timezone: "Australia/Sydney".into(),
            words: "previous words".into(),
            word_count: 2,
            start_time: datetime!(2026-08-29 08:00 UTC),
            finish_time: datetime!(2026-08-29 08:00 UTC),
            milestone_word_count,
            milestone_time,
            created_at: datetime!(2026-08-29 08:00 UTC),
            updated_at: datetime!(2026-08-29 08:00 UTC),
        }
    }

    #[test]
    fn counts_whitespace_delimited_words() {
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("   "), 0);
        assert_eq!(count_words("My first entry..."), 3);
        assert_eq!(count_words("one\ntwo\tthree  four"), 4);
    }

    #[test]
    fn create_rejects_non_today_date() {
        let now = datetime!(2026-08-29 10:00 UTC);
        let err = prepare_create(date!(2026 - 08 - 28), "words", &profile(700), now).unwrap_err();
        match err {
            ApiError::Business(fields) => assert!(fields.contains_key("entry_date")),
            other => panic!("expected business error, got {other:?}"),
        }
    }

    #[test]
    fn create_snapshots_profile_and_sets_times() {
        let now = datetime!(2026-08-29 10:00 UTC);
        let new = prepare_create(date!(2026 - 08 - 29), "just three words", &profile(700), now)
            .expect("create ok");
        assert_eq!(new.entry_timezone, "Australia/Sydney");
        assert_eq!(new.milestone_word_count, 700);
        assert_eq!(new.word_count, 3);
        assert_eq!(new.start_time, now);
        assert_eq!(new.finish_time, now);
        assert_eq!(new.milestone_time, None);
    }

    #[test]
    fn create_sets_milestone_when_target_reached() {
        let now = datetime!(2026-08-29 10:00 UTC);
        let new = prepare_create(date!(2026 - 08 - 29), "a b c d e", &profile(5), now)
            .expect("create ok");
        assert_eq!(new.milestone_time, Some(now));
    }

    #[test]
    fn create_milestone_boundary_is_inclusive() {
        let now = datetime!(2026-08-29 10:00 UTC);
        let below = prepare_create(date!(2026 - 08 - 29), "a b c d", &profile(5), now).unwrap();
        assert_eq!(below.milestone_time, None);
        let exact = prepare_create(date!(2026 - 08 - 29), "a b c d e", &profile(5), now).unwrap();
        assert_eq!(exact.milestone_time, Some(now));
    }

    #[test]
    fn update_rejects_date_change() {
        let now = datetime!(2026-08-29 10:00 UTC);
        let entry = existing_entry(date!(2026 - 08 - 29), 700, None);
        let err = prepare_update(&entry, Some(date!(2026 - 08 - 28)), None, "words", now)
            .unwrap_err();
        match err {
            ApiError::Business(fields) => {
                let detail = &fields["entry_date"][0];
                assert_eq!(detail.message, "Entry date may not be modified");
            }
            other => panic!("expected business error, got {other:?}"),
        }
    }

    #[test]
    fn update_rejects_entry_frozen_after_day_rollover() {
        let now = datetime!(2026-08-30 00:01 UTC);
        let entry = existing_entry(date!(2026 - 08 - 29), 700, None);
        let err = prepare_update(&entry, Some(date!(2026 - 08 - 29)), None, "words", now)
            .unwrap_err();
        match err {
            ApiError::Business(fields) => {
                let detail = &fields["entry_date"][0];
                assert_eq!(detail.message, "Entry date must be today's date (UTC)");
            }
            other => panic!("expected business error, got {other:?}"),
        }
    }

    #[test]
    fn update_rejects_start_time_change() {
        let now = datetime!(2026-08-29 10:00 UTC);
        let entry = existing_entry(date!(2026 - 08 - 29), 700, None);
        let err = prepare_update(
            &entry,
            None,
            Some(datetime!(2026-08-29 09:30 UTC)),
            "words",
            now,
        )
        .unwrap_err();
        match err {
            ApiError::Business(fields) => assert!(fields.contains_key("start_time")),
            other => panic!("expected business error, got {other:?}"),
        }
    }

    #[test]
    fn update_allows_unchanged_start_time() {
        let now = datetime!(2026-08-29 10:00 UTC);
        let entry = existing_entry(date!(2026 - 08 - 29), 700, None);
        let changes = prepare_update(&entry, None, Some(entry.start_time), "a few more words", now)
            .expect("update ok");
        assert_eq!(changes.word_count, 4);
        assert_eq!(changes.finish_time, now);
    }

    #[test]
    fn update_sets_milestone_on_first_reach() {
        let now = datetime!(2026-08-29 11:00 UTC);
        let entry = existing_entry(date!(2026 - 08 - 29), 3, None);
        let changes = prepare_update(&entry, None, None, "one two three", now).expect("update ok");
        assert_eq!(changes.milestone_time, Some(now));
    }

    #[test]
    fn update_never_moves_an_existing_milestone() {
        let reached = datetime!(2026-08-29 09:00 UTC);
        let now = datetime!(2026-08-29 11:00 UTC);
        let entry = existing_entry(date!(2026 - 08 - 29), 3, Some(reached));

        // Word count grows: milestone stays where it was first reached.
        let changes =
            prepare_update(&entry, None, None, "one two three four five", now).expect("update ok");
        assert_eq!(changes.milestone_time, Some(reached));

        // Word count drops below the target: milestone is still not cleared.
        let changes = prepare_update(&entry, None, None, "one", now).expect("update ok");
        assert_eq!(changes.milestone_time, Some(reached));
    }

    #[test]
    fn update_leaves_milestone_unset_below_target() {
        let now = datetime!(2026-08-29 11:00 UTC);
        let entry = existing_entry(date!(2026 - 08 - 29), 700, None);
        let changes = prepare_update(&entry, None, None, "too short", now).expect("update ok");
        assert_eq!(changes.milestone_time, None);
    }
}
