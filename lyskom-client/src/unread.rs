//! Unread text resolution.
//!
//! A membership records what has been read as a list of inclusive local
//! number ranges. Everything between those ranges, and everything after the
//! last one, is unread. Local numbers are translated to global text numbers
//! with paginated `local-to-global` calls.

use crate::error::ClientError;
use lyskom_protocol::{
    ErrorCode, LocalTextNo, Membership, ReadRange, TextMapping, TextNo, MAX_MAPPING_PAGE,
};
use std::future::Future;

/// Unread gaps as `(first, count)` pairs, and the first local number after
/// the last read range.
///
/// All-zero ranges carry no information and are dropped, so an empty or
/// all-zero list gives no gaps and a tail starting at 1.
pub fn read_gaps(ranges: &[ReadRange]) -> (Vec<(LocalTextNo, u32)>, LocalTextNo) {
    let mut ranges: Vec<ReadRange> = ranges.iter().copied().filter(|r| !r.is_empty()).collect();
    ranges.sort_by_key(|r| r.first_read);

    let mut gaps = Vec::new();
    let mut next: LocalTextNo = 1;
    for range in ranges {
        if range.first_read > next {
            gaps.push((next, range.first_read - next));
        }
        next = next.max(range.last_read.saturating_add(1));
    }
    (gaps, next)
}

/// Whether `err` means the conference has no texts at the asked position.
fn is_end_of_conference(err: &ClientError) -> bool {
    err.error_code() == Some(ErrorCode::NoSuchLocalText)
}

/// Appends the live global numbers of `mapping` that fall in `[from, to)`.
fn collect(
    mapping: &TextMapping,
    from: LocalTextNo,
    to: Option<LocalTextNo>,
    out: &mut Vec<TextNo>,
) {
    out.extend(
        mapping
            .pairs
            .iter()
            .filter(|(local, global)| {
                *global != 0 && *local >= from && to.map_or(true, |to| *local < to)
            })
            .map(|(_, global)| *global),
    );
}

/// Resolves the unread global text numbers of `membership`.
///
/// `map(first, count)` must perform a `local-to-global` call for the
/// membership's conference. Results are ordered gap by gap, then the tail.
pub async fn resolve_unread<F, Fut>(
    membership: &Membership,
    mut map: F,
) -> Result<Vec<TextNo>, ClientError>
where
    F: FnMut(LocalTextNo, u32) -> Fut,
    Fut: Future<Output = Result<TextMapping, ClientError>>,
{
    let (gaps, tail_start) = read_gaps(&membership.read_ranges);
    let mut unread = Vec::new();

    for (first, count) in gaps {
        let end = first.saturating_add(count);
        let mut next = first;
        while next < end {
            let page = (end - next).min(MAX_MAPPING_PAGE);
            let mapping = match map(next, page).await {
                Ok(mapping) => mapping,
                Err(e) if is_end_of_conference(&e) => break,
                Err(e) => return Err(e),
            };
            collect(&mapping, next, Some(end), &mut unread);
            if mapping.range_end <= next {
                break;
            }
            next = mapping.range_end;
        }
    }

    let mut next = tail_start;
    loop {
        let mapping = match map(next, MAX_MAPPING_PAGE).await {
            Ok(mapping) => mapping,
            Err(e) if is_end_of_conference(&e) => break,
            Err(e) => return Err(e),
        };
        collect(&mapping, next, None, &mut unread);
        if !mapping.later_texts_exists || mapping.range_end <= next {
            break;
        }
        next = mapping.range_end;
    }

    tracing::debug!(
        "Conference {} has {} unread texts",
        membership.conference,
        unread.len()
    );
    Ok(unread)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyskom_protocol::{MembershipType, Time};
    use parking_lot::Mutex;
    use std::collections::BTreeSet;

    fn membership(ranges: &[(u32, u32)]) -> Membership {
        Membership {
            position: 0,
            last_time_read: Time::default(),
            conference: 42,
            priority: 100,
            read_ranges: ranges
                .iter()
                .map(|&(first, last)| ReadRange::new(first, last))
                .collect(),
            added_by: 6,
            added_at: Time::default(),
            membership_type: MembershipType::default(),
        }
    }

    /// A conference holding local texts `1..=highest`, where local `n` maps
    /// to global `1000 + n` unless it was deleted.
    struct FakeConference {
        highest: LocalTextNo,
        deleted: BTreeSet<LocalTextNo>,
        calls: Mutex<Vec<(LocalTextNo, u32)>>,
    }

    impl FakeConference {
        fn new(highest: LocalTextNo) -> Self {
            Self {
                highest,
                deleted: BTreeSet::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn map(&self, first: LocalTextNo, count: u32) -> Result<TextMapping, ClientError> {
            self.calls.lock().push((first, count));
            assert!(count <= MAX_MAPPING_PAGE);
            if first > self.highest {
                return Err(ClientError::Server {
                    code: ErrorCode::NoSuchLocalText,
                    detail: first,
                });
            }
            let range_end = (first + count).min(self.highest + 1);
            let pairs = (first..range_end)
                .map(|local| {
                    let global = if self.deleted.contains(&local) {
                        0
                    } else {
                        1000 + local
                    };
                    (local, global)
                })
                .collect();
            Ok(TextMapping {
                range_begin: first,
                range_end,
                later_texts_exists: range_end <= self.highest,
                pairs,
            })
        }

        async fn resolve(&self, m: &Membership) -> Vec<TextNo> {
            resolve_unread(m, |first, count| async move { self.map(first, count) })
                .await
                .unwrap()
        }
    }

    fn globals(locals: impl IntoIterator<Item = u32>) -> Vec<TextNo> {
        locals.into_iter().map(|local| 1000 + local).collect()
    }

    #[test]
    fn test_read_gaps() {
        let ranges = [
            ReadRange::new(8, 10),
            ReadRange::new(1, 1),
            ReadRange::new(5, 5),
            ReadRange::new(2, 3),
        ];
        assert_eq!(read_gaps(&ranges), (vec![(4, 1), (6, 2)], 11));

        // Leading gap
        assert_eq!(read_gaps(&[ReadRange::new(3, 4)]), (vec![(1, 2)], 5));
    }

    #[test]
    fn test_read_gaps_empty() {
        assert_eq!(read_gaps(&[]), (vec![], 1));
        assert_eq!(read_gaps(&[ReadRange::new(0, 0)]), (vec![], 1));
    }

    #[tokio::test]
    async fn test_gaps_then_tail() {
        let conf = FakeConference::new(12);
        let m = membership(&[(1, 1), (2, 3), (5, 5), (8, 10)]);
        assert_eq!(conf.resolve(&m).await, globals([4, 6, 7, 11, 12]));
    }

    #[tokio::test]
    async fn test_empty_ranges_scan_everything() {
        let conf = FakeConference::new(600);
        let unread = conf.resolve(&membership(&[])).await;
        assert_eq!(unread, globals(1..=600));
        // 255 + 255 + 90, the last page reports no later texts
        assert_eq!(
            *conf.calls.lock(),
            vec![(1, 255), (256, 255), (511, 255)]
        );
    }

    #[tokio::test]
    async fn test_gap_across_page_boundary() {
        let conf = FakeConference::new(257);
        let unread = conf.resolve(&membership(&[(257, 257)])).await;
        assert_eq!(unread, globals(1..=256));
        assert_eq!(
            *conf.calls.lock(),
            vec![(1, 255), (256, 1), (258, 255)]
        );
    }

    #[tokio::test]
    async fn test_deleted_texts_are_skipped() {
        let mut conf = FakeConference::new(6);
        conf.deleted.insert(2);
        conf.deleted.insert(5);
        let unread = conf.resolve(&membership(&[(3, 3)])).await;
        assert_eq!(unread, globals([1, 4, 6]));
    }

    #[tokio::test]
    async fn test_everything_read() {
        let conf = FakeConference::new(10);
        assert!(conf.resolve(&membership(&[(1, 10)])).await.is_empty());
    }

    #[tokio::test]
    async fn test_overrunning_page_is_clipped_to_gap() {
        // The server counts existing texts, so a page may cover more local
        // numbers than asked for.
        let m = membership(&[(1, 1), (4, 4)]);
        let unread = resolve_unread(&m, |first, _count| async move {
            if first > 4 {
                return Err(ClientError::Server {
                    code: ErrorCode::NoSuchLocalText,
                    detail: first,
                });
            }
            Ok(TextMapping {
                range_begin: first,
                range_end: 5,
                later_texts_exists: false,
                pairs: (first..5).map(|local| (local, 1000 + local)).collect(),
            })
        })
        .await
        .unwrap();
        assert_eq!(unread, globals([2, 3]));
    }

    #[tokio::test]
    async fn test_other_errors_propagate() {
        let m = membership(&[]);
        let result = resolve_unread(&m, |_, _| async {
            Err::<TextMapping, _>(ClientError::Server {
                code: ErrorCode::NotMember,
                detail: 42,
            })
        })
        .await;
        assert_eq!(
            result.unwrap_err().error_code(),
            Some(ErrorCode::NotMember)
        );
    }
}
