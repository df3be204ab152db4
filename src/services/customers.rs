use crate::dto::customers::CustomerForm;
use crate::errors::ServiceError;
use crate::models::customer::{self, Entity as CustomerEntity};
use chrono::Utc;
use metrics::counter;
use sea_orm::sea_query::{Expr, Func, LikeExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

pub const CUSTOMER_NOT_FOUND: &str = "Customer not found.";
const DUPLICATE_PHONE: &str = "You already have a customer with this phone number.";

/// One page of the home page's customer list
#[derive(Debug, Clone, Serialize)]
pub struct CustomerPage {
    pub items: Vec<customer::Model>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub num_pages: u64,
    pub has_previous: bool,
    pub has_next: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

/// Parses the `cust` parameter. Anything that is not a positive id is treated
/// like an id that does not exist.
pub fn parse_customer_id(raw: Option<&str>) -> Result<i32, ServiceError> {
    raw.map(str::trim)
        .and_then(|s| s.parse::<i32>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| ServiceError::NotFound(CUSTOMER_NOT_FOUND.to_string()))
}

/// Picks the page to show: non-numeric or below one gives the first page,
/// past the end gives the last. There is always at least one page.
pub fn resolve_page(raw: Option<&str>, num_pages: u64) -> u64 {
    let last = num_pages.max(1);
    match raw.map(str::trim).map(str::parse::<i64>) {
        Some(Ok(n)) if n > last as i64 => last,
        Some(Ok(n)) if n >= 1 => n as u64,
        _ => 1,
    }
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Customers, always scoped to the user that owns them
#[derive(Debug, Clone)]
pub struct CustomerService {
    db: Arc<DatabaseConnection>,
    per_page: u64,
}

impl CustomerService {
    pub fn new(db: Arc<DatabaseConnection>, per_page: u64) -> Self {
        Self {
            db,
            per_page: per_page.max(1),
        }
    }

    /// Lists `owner`'s customers ordered by name, optionally filtered by a
    /// case-insensitive substring of name or phone.
    #[instrument(skip(self))]
    pub async fn list_page(
        &self,
        owner: Uuid,
        search: Option<&str>,
        page: Option<&str>,
    ) -> Result<CustomerPage, ServiceError> {
        let db = &*self.db;
        let search = search.map(str::trim).filter(|s| !s.is_empty());

        let mut query = CustomerEntity::find().filter(customer::Column::UserId.eq(owner));

        if let Some(term) = search {
            let pattern = like_pattern(&term.to_lowercase());
            query = query.filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col(customer::Column::CustName)))
                            .like(LikeExpr::new(pattern.clone()).escape('\\')),
                    )
                    .add(
                        Expr::col(customer::Column::Phone)
                            .like(LikeExpr::new(pattern).escape('\\')),
                    ),
            );
        }

        let paginator = query
            .order_by_asc(customer::Column::CustName)
            .order_by_asc(customer::Column::CustId)
            .paginate(db, self.per_page);

        let total = paginator.num_items().await.map_err(|e| {
            error!("Failed to count customers: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let num_pages = total.div_ceil(self.per_page).max(1);
        let page = resolve_page(page, num_pages);

        let items = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!("Failed to fetch customers page {}: {}", page, e);
            ServiceError::DatabaseError(e)
        })?;

        Ok(CustomerPage {
            items,
            page,
            per_page: self.per_page,
            total,
            num_pages,
            has_previous: page > 1,
            has_next: page < num_pages,
            search: search.map(str::to_string),
        })
    }

    /// Fetches a customer owned by `owner`; someone else's customer is reported
    /// exactly like a missing one.
    #[instrument(skip(self))]
    pub async fn get_owned(&self, owner: Uuid, cust_id: i32) -> Result<customer::Model, ServiceError> {
        CustomerEntity::find_by_id(cust_id)
            .filter(customer::Column::UserId.eq(owner))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(CUSTOMER_NOT_FOUND.to_string()))
    }

    async fn phone_in_use(
        &self,
        owner: Uuid,
        phone: &str,
        except: Option<i32>,
    ) -> Result<bool, ServiceError> {
        let mut query = CustomerEntity::find()
            .filter(customer::Column::UserId.eq(owner))
            .filter(customer::Column::Phone.eq(phone));
        if let Some(cust_id) = except {
            query = query.filter(customer::Column::CustId.ne(cust_id));
        }
        Ok(query.one(&*self.db).await?.is_some())
    }

    #[instrument(skip(self, form))]
    pub async fn create(
        &self,
        owner: Uuid,
        form: CustomerForm,
    ) -> Result<customer::Model, ServiceError> {
        let form = form.normalized();
        if self.phone_in_use(owner, &form.phone, None).await? {
            return Err(ServiceError::ValidationError(DUPLICATE_PHONE.to_string()));
        }

        let now = Utc::now();
        let created = customer::ActiveModel {
            user_id: Set(owner),
            cust_name: Set(form.cust_name),
            phone: Set(form.phone),
            email: Set(form.email),
            address: Set(form.address),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::ValidationError(DUPLICATE_PHONE.to_string())
            } else {
                error!("Failed to create customer: {}", e);
                ServiceError::DatabaseError(e)
            }
        })?;

        counter!("shopkeeper.customers.created", 1);
        info!(cust_id = created.cust_id, "Customer created");
        Ok(created)
    }

    #[instrument(skip(self, form))]
    pub async fn update(
        &self,
        owner: Uuid,
        cust_id: i32,
        form: CustomerForm,
    ) -> Result<customer::Model, ServiceError> {
        let existing = self.get_owned(owner, cust_id).await?;
        let form = form.normalized();
        if self.phone_in_use(owner, &form.phone, Some(cust_id)).await? {
            return Err(ServiceError::ValidationError(DUPLICATE_PHONE.to_string()));
        }

        let mut active: customer::ActiveModel = existing.into();
        active.cust_name = Set(form.cust_name);
        active.phone = Set(form.phone);
        active.email = Set(form.email);
        active.address = Set(form.address);
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await.map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::ValidationError(DUPLICATE_PHONE.to_string())
            } else {
                error!("Failed to update customer {}: {}", cust_id, e);
                ServiceError::DatabaseError(e)
            }
        })?;

        info!(cust_id, "Customer updated");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case(None, 3, 1)]
    #[case(Some("2"), 3, 2)]
    #[case(Some("0"), 3, 1)]
    #[case(Some("-4"), 3, 1)]
    #[case(Some("99"), 3, 3)]
    #[case(Some("abc"), 3, 1)]
    #[case(Some("5"), 0, 1)]
    fn page_resolution_clamps(#[case] raw: Option<&str>, #[case] pages: u64, #[case] expected: u64) {
        assert_eq!(resolve_page(raw, pages), expected);
    }

    #[test]
    fn customer_id_parsing() {
        assert_eq!(parse_customer_id(Some(" 12 ")).unwrap(), 12);
        assert_matches!(parse_customer_id(None), Err(ServiceError::NotFound(_)));
        assert_matches!(parse_customer_id(Some("x1")), Err(ServiceError::NotFound(_)));
        assert_matches!(parse_customer_id(Some("0")), Err(ServiceError::NotFound(_)));
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
