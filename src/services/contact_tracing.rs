use crate::errors::ServiceError;
use crate::models::customer::{self, Entity as CustomerEntity};
use crate::models::store_visit::{self, Entity as StoreVisitEntity};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// One of their visits that fell within the window of one of ours
#[derive(Debug, Clone, Serialize)]
pub struct Overlap {
    pub their_visit: store_visit::Model,
    pub our_visit: store_visit::Model,
    pub gap_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Contact {
    pub customer: customer::Model,
    pub overlaps: Vec<Overlap>,
}

impl Contact {
    fn closest_gap(&self) -> i64 {
        self.overlaps
            .iter()
            .map(|o| o.gap_minutes)
            .min()
            .unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactReport {
    pub customer: customer::Model,
    pub window_minutes: i64,
    pub lookback_days: i64,
    pub visits: Vec<store_visit::Model>,
    pub contacts: Vec<Contact>,
}

fn abs_gap(a: DateTime<Utc>, b: DateTime<Utc>) -> Duration {
    if a >= b {
        a - b
    } else {
        b - a
    }
}

/// Pairs each of `theirs` with the closest visit in `ours` when the two are at
/// most `window` apart. Visits with no such partner are left out.
pub fn find_overlaps(
    ours: &[store_visit::Model],
    theirs: &[store_visit::Model],
    window: Duration,
) -> Vec<Overlap> {
    theirs
        .iter()
        .filter_map(|their| {
            ours.iter()
                .map(|our| (our, abs_gap(their.visited_at, our.visited_at)))
                .filter(|(_, gap)| *gap <= window)
                .min_by_key(|(_, gap)| *gap)
                .map(|(our, gap)| Overlap {
                    their_visit: their.clone(),
                    our_visit: our.clone(),
                    gap_minutes: gap.num_minutes(),
                })
        })
        .collect()
}

/// Lists other customers of the same user whose store visits were close in
/// time to a given customer's recent visits.
#[derive(Debug, Clone)]
pub struct ContactTracingService {
    db: Arc<DatabaseConnection>,
    window: Duration,
    lookback: Duration,
}

impl ContactTracingService {
    pub fn new(db: Arc<DatabaseConnection>, window_minutes: i64, lookback_days: i64) -> Self {
        Self {
            db,
            window: Duration::minutes(window_minutes),
            lookback: Duration::days(lookback_days),
        }
    }

    /// `customer` must already be known to belong to `owner`.
    #[instrument(skip(self, customer), fields(cust_id = customer.cust_id))]
    pub async fn trace(
        &self,
        owner: Uuid,
        customer: &customer::Model,
    ) -> Result<ContactReport, ServiceError> {
        let since: DateTime<Utc> = Utc::now() - self.lookback;

        let visits = StoreVisitEntity::find()
            .filter(store_visit::Column::CustId.eq(customer.cust_id))
            .filter(store_visit::Column::VisitedAt.gte(since))
            .order_by_desc(store_visit::Column::VisitedAt)
            .all(&*self.db)
            .await?;

        let mut contacts = Vec::new();

        if let (Some(earliest), Some(latest)) = (
            visits.iter().map(|v| v.visited_at).min(),
            visits.iter().map(|v| v.visited_at).max(),
        ) {
            let candidates = StoreVisitEntity::find()
                .find_also_related(CustomerEntity)
                .filter(customer::Column::UserId.eq(owner))
                .filter(store_visit::Column::CustId.ne(customer.cust_id))
                .filter(
                    store_visit::Column::VisitedAt
                        .between(earliest - self.window, latest + self.window),
                )
                .order_by_asc(store_visit::Column::VisitedAt)
                .all(&*self.db)
                .await?;

            let mut by_customer: BTreeMap<i32, (customer::Model, Vec<store_visit::Model>)> =
                BTreeMap::new();
            for (visit, other) in candidates {
                if let Some(other) = other {
                    by_customer
                        .entry(other.cust_id)
                        .or_insert_with(|| (other, Vec::new()))
                        .1
                        .push(visit);
                }
            }

            contacts = by_customer
                .into_values()
                .filter_map(|(other, their_visits)| {
                    let overlaps = find_overlaps(&visits, &their_visits, self.window);
                    (!overlaps.is_empty()).then_some(Contact {
                        customer: other,
                        overlaps,
                    })
                })
                .collect();

            contacts.sort_by(|a, b| {
                a.closest_gap()
                    .cmp(&b.closest_gap())
                    .then_with(|| a.customer.cust_name.cmp(&b.customer.cust_name))
            });
        }

        debug!(contacts = contacts.len(), "Contact trace complete");

        Ok(ContactReport {
            customer: customer.clone(),
            window_minutes: self.window.num_minutes(),
            lookback_days: self.lookback.num_days(),
            visits,
            contacts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn visit(id: i32, cust_id: i32, hour: u32, minute: u32) -> store_visit::Model {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap();
        store_visit::Model {
            id,
            cust_id,
            visited_at: at,
            temperature: None,
            notes: None,
            created_at: at,
        }
    }

    #[test]
    fn overlaps_respect_window_inclusively() {
        let ours = vec![visit(1, 1, 10, 0)];
        let theirs = vec![
            visit(2, 2, 10, 30),
            visit(3, 2, 10, 31),
            visit(4, 2, 9, 45),
        ];

        let overlaps = find_overlaps(&ours, &theirs, Duration::minutes(30));
        let ids: Vec<i32> = overlaps.iter().map(|o| o.their_visit.id).collect();
        assert_eq!(ids, vec![2, 4]);
        assert_eq!(overlaps[0].gap_minutes, 30);
        assert_eq!(overlaps[1].gap_minutes, 15);
    }

    #[test]
    fn pairs_with_closest_of_our_visits() {
        let ours = vec![visit(1, 1, 10, 0), visit(2, 1, 11, 0)];
        let theirs = vec![visit(3, 2, 10, 50)];

        let overlaps = find_overlaps(&ours, &theirs, Duration::minutes(60));
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].our_visit.id, 2);
        assert_eq!(overlaps[0].gap_minutes, 10);
    }

    #[test]
    fn no_visits_means_no_overlaps() {
        assert!(find_overlaps(&[], &[visit(1, 2, 10, 0)], Duration::minutes(30)).is_empty());
    }
}
