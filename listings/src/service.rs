//! Listing service.
//!
//! Orchestrates the pipeline for every operation exposed to the outer
//! (HTTP) layer.
//!
//! Mutations run as:
//!
//! ```text
//! role check -> validate -> idempotency claim -> begin
//!     -> reconciler / moderation -> commit (rollback on error)
//!     -> invalidate keys_for(mutation) (best-effort)
//! ```
//!
//! A claim is released when the operation is rolled back after admission,
//! and kept until its TTL otherwise, including when the commit itself
//! fails. Cache invalidation runs only after a successful commit and its
//! failure never fails the request.
//!
//! Reads go through [`CacheGateway::get_or_load`], except search, which is
//! never cached.

use crate::cache::{CacheGateway, CacheKey, Mutation, keys_for};
use crate::config::ListingConfig;
use crate::error::{ListingError, Result};
use crate::idempotency::{Claim, IdempotencyGuard, PayloadFingerprint};
use crate::moderation::{self, ModerationCommand, ModerationOutcome};
use crate::projection::{
    self, AdminListingView, Banner, ListingSummary, ListingView, OwnerListingView,
    PublicListingView, RoomView, StatsView, Viewer,
};
use crate::providers::{KeyValueStore, ListQuery, ListingStore, ListingTransaction};
use crate::reconciler::{self, SaveOutcome, StockReport};
use crate::search::{self, SearchFilters, SearchHit};
use crate::state::{
    ListingId, ListingPayload, ListingStatus, Page, PageRequest, Principal, Role, StockUpdate,
    UserId,
};
use crate::validation;

/// Entry point for listing mutations and reads.
#[derive(Clone)]
pub struct ListingService<S: ListingStore, K: KeyValueStore> {
    store: S,
    cache: CacheGateway<K>,
    guard: IdempotencyGuard<K>,
    config: ListingConfig,
}

fn require_role(principal: &Principal, role: Role) -> Result<()> {
    if principal.role == role {
        Ok(())
    } else {
        Err(ListingError::InsufficientPermissions {
            required: role.as_str().to_string(),
        })
    }
}

impl<S: ListingStore, K: KeyValueStore> ListingService<S, K> {
    /// Create a service.
    ///
    /// `cache_store` backs the read cache and `claim_store` the idempotency
    /// claims; they may be clones of one store.
    #[must_use]
    pub const fn new(store: S, cache_store: K, claim_store: K, config: ListingConfig) -> Self {
        Self {
            store,
            cache: CacheGateway::new(cache_store),
            guard: IdempotencyGuard::new(claim_store),
            config,
        }
    }

    /// The underlying listing store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The read cache.
    #[must_use]
    pub const fn cache(&self) -> &CacheGateway<K> {
        &self.cache
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ListingConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════
    // Mutations
    // ═══════════════════════════════════════════════════════════════════

    /// Create or update a listing with its rooms and images.
    ///
    /// The listing is reset to `pending` on every save.
    ///
    /// # Errors
    ///
    /// - [`ListingError::InsufficientPermissions`] unless called by a merchant
    /// - [`ListingError::Validation`] for a malformed payload or blank request id
    /// - [`ListingError::DuplicateSubmission`] if the same save is in flight
    /// - [`ListingError::NotFound`] if `payload.id` is not the caller's listing
    /// - Infrastructure errors (claim store, database)
    #[tracing::instrument(skip(self, payload), fields(principal_id = %principal.id, listing_id = ?payload.id))]
    pub async fn save_listing(
        &self,
        principal: &Principal,
        request_id: &str,
        payload: &ListingPayload,
    ) -> Result<SaveOutcome> {
        require_role(principal, Role::Merchant)?;
        validation::validate_listing(payload)?;

        let claim = self
            .admit(principal, request_id, &PayloadFingerprint::for_listing(payload))
            .await?;

        let finished = match self.store.begin().await {
            Ok(mut tx) => {
                let result = reconciler::save_listing(&mut tx, principal, payload).await;
                finish(tx, result).await
            }
            Err(e) => Finished::Aborted(e),
        };

        let outcome = self.settle(claim, finished).await?;

        tracing::info!(
            listing_id = %outcome.listing_id,
            owner_id = %outcome.owner_id,
            created = outcome.created,
            rooms_updated = outcome.rooms_updated.len(),
            rooms_created = outcome.rooms_created.len(),
            rooms_deleted = outcome.rooms_deleted.len(),
            status = %ListingStatus::Pending,
            "Saved listing"
        );
        self.invalidate(Mutation::Save, outcome.listing_id, outcome.owner_id)
            .await;

        Ok(outcome)
    }

    /// Update room stock of an approved listing without re-moderation.
    ///
    /// # Errors
    ///
    /// - [`ListingError::InsufficientPermissions`] unless called by a merchant
    /// - [`ListingError::Validation`] for an empty batch or repeated room
    /// - [`ListingError::DuplicateSubmission`] if the same update is in flight
    /// - [`ListingError::NotFound`] if the listing is not the caller's
    /// - [`ListingError::StockEditNotAllowed`] unless the listing is `approved`
    /// - Infrastructure errors
    #[tracing::instrument(skip(self, updates, listing_id), fields(principal_id = %principal.id, listing_id = %listing_id))]
    pub async fn update_stock(
        &self,
        principal: &Principal,
        request_id: &str,
        listing_id: ListingId,
        updates: &[StockUpdate],
    ) -> Result<StockReport> {
        require_role(principal, Role::Merchant)?;
        validation::validate_stock_updates(updates)?;

        let fingerprint = PayloadFingerprint::for_stock_update(listing_id, updates);
        let claim = self.admit(principal, request_id, &fingerprint).await?;

        let finished = match self.store.begin().await {
            Ok(mut tx) => {
                let result =
                    reconciler::update_stock(&mut tx, principal, listing_id, updates).await;
                finish(tx, result).await
            }
            Err(e) => Finished::Aborted(e),
        };

        let report = self.settle(claim, finished).await?;

        tracing::info!(
            listing_id = %report.listing_id,
            owner_id = %report.owner_id,
            applied = report.applied_count(),
            skipped = report.items.len() - report.applied_count(),
            "Updated room stock"
        );
        self.invalidate(Mutation::StockUpdate, report.listing_id, report.owner_id)
            .await;

        Ok(report)
    }

    /// Approve or reject a pending listing.
    ///
    /// # Errors
    ///
    /// - [`ListingError::InsufficientPermissions`] unless called by an admin
    /// - [`ListingError::Validation`] for a rejection without reason or an
    ///   unsupported target
    /// - [`ListingError::DuplicateSubmission`] if the same decision is in flight
    /// - [`ListingError::NotFound`] if the listing does not exist
    /// - [`ListingError::StateConflict`] unless the listing is `pending`
    /// - Infrastructure errors
    pub async fn audit(
        &self,
        principal: &Principal,
        request_id: &str,
        listing_id: ListingId,
        target: ListingStatus,
        reason: Option<String>,
    ) -> Result<ModerationOutcome> {
        let command = ModerationCommand::Audit { target, reason };
        self.moderate(principal, request_id, listing_id, &command, Mutation::Audit)
            .await
    }

    /// Take an approved listing offline or bring an offline one back.
    ///
    /// # Errors
    ///
    /// - [`ListingError::InsufficientPermissions`] unless called by an admin
    /// - [`ListingError::Validation`] for an unsupported target
    /// - [`ListingError::DuplicateSubmission`] if the same toggle is in flight
    /// - [`ListingError::NotFound`] if the listing does not exist
    /// - [`ListingError::StateConflict`] unless the listing is `approved` or
    ///   `offline` and the target differs from the current status
    /// - Infrastructure errors
    pub async fn toggle_status(
        &self,
        principal: &Principal,
        request_id: &str,
        listing_id: ListingId,
        target: ListingStatus,
    ) -> Result<ModerationOutcome> {
        let command = ModerationCommand::Toggle { target };
        self.moderate(principal, request_id, listing_id, &command, Mutation::Toggle)
            .await
    }

    #[tracing::instrument(skip(self, command, listing_id, mutation), fields(principal_id = %principal.id, listing_id = %listing_id, target = %command.target()))]
    async fn moderate(
        &self,
        principal: &Principal,
        request_id: &str,
        listing_id: ListingId,
        command: &ModerationCommand,
        mutation: Mutation,
    ) -> Result<ModerationOutcome> {
        require_role(principal, Role::Admin)?;
        command.validate()?;

        let fingerprint = PayloadFingerprint::for_moderation(listing_id, command.target());
        let claim = self.admit(principal, request_id, &fingerprint).await?;

        let finished = match self.store.begin().await {
            Ok(mut tx) => {
                let result = moderation::apply(&mut tx, principal, listing_id, command).await;
                finish(tx, result).await
            }
            Err(e) => Finished::Aborted(e),
        };

        let outcome = self.settle(claim, finished).await?;

        tracing::info!(
            listing_id = %outcome.listing_id,
            owner_id = %outcome.owner_id,
            from = %outcome.from,
            to = %outcome.to,
            audit_record_id = %outcome.audit_record_id,
            "Moderated listing"
        );
        self.invalidate(mutation, outcome.listing_id, outcome.owner_id)
            .await;

        Ok(outcome)
    }

    async fn admit(
        &self,
        principal: &Principal,
        request_id: &str,
        fingerprint: &PayloadFingerprint,
    ) -> Result<Claim> {
        self.guard
            .claim(principal, request_id, fingerprint, self.config.idempotency_ttl)
            .await
    }

    /// Release the claim if the admitted operation was rolled back.
    ///
    /// A failed commit keeps the claim: the writes may have landed, so a
    /// retry under the same request id must not run them a second time.
    async fn settle<T>(&self, claim: Claim, finished: Finished<T>) -> Result<T> {
        match finished {
            Finished::Committed(value) => Ok(value),
            Finished::Aborted(e) => {
                if e.is_infrastructure() {
                    tracing::error!(error = %e, "Listing mutation failed");
                }
                self.guard.release(claim).await;
                Err(e)
            }
            Finished::CommitFailed(e) => {
                tracing::error!(
                    error = %e,
                    "Commit outcome unknown, keeping idempotency claim"
                );
                Err(e)
            }
        }
    }

    async fn invalidate(&self, mutation: Mutation, listing_id: ListingId, owner_id: UserId) {
        let keys = keys_for(mutation, listing_id, owner_id);
        if let Err(e) = self.cache.invalidate_all(&keys).await {
            tracing::warn!(
                listing_id = %listing_id,
                owner_id = %owner_id,
                error = %e,
                "Cache invalidation failed, stale entries expire with their TTL"
            );
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════

    /// Listing detail rendered for `viewer`.
    ///
    /// # Errors
    ///
    /// - [`ListingError::NotFound`] if the listing does not exist or the
    ///   viewer may not see it
    /// - Infrastructure errors from the listing store
    pub async fn listing_detail(&self, viewer: Viewer, listing_id: ListingId) -> Result<ListingView> {
        let key = CacheKey::ListingDetail {
            scope: viewer.scope(),
            listing_id,
        };

        let view = self
            .cache
            .get_or_load(&key, self.config.detail_ttl, || async move {
                let aggregate = self
                    .store
                    .load_listing(listing_id)
                    .await?
                    .ok_or(ListingError::NotFound)?;
                let history = if viewer == Viewer::Admin {
                    self.store.audit_history(listing_id).await?
                } else {
                    Vec::new()
                };
                projection::project(&aggregate, viewer, history).ok_or(ListingError::NotFound)
            })
            .await?;

        if view.visible_to(viewer) && view.listing_id() == listing_id {
            Ok(view)
        } else {
            Err(ListingError::NotFound)
        }
    }

    /// Detail of one of the merchant's own listings.
    ///
    /// # Errors
    ///
    /// - [`ListingError::InsufficientPermissions`] unless called by a merchant
    /// - [`ListingError::NotFound`] if the listing is missing or not theirs
    /// - Infrastructure errors
    pub async fn owner_detail(&self, principal: &Principal, listing_id: ListingId) -> Result<OwnerListingView> {
        match self.listing_detail(Viewer::owner(principal)?, listing_id).await? {
            ListingView::Owner(view) => Ok(view),
            _ => Err(ListingError::NotFound),
        }
    }

    /// Moderator detail, including owner name and audit history.
    ///
    /// # Errors
    ///
    /// - [`ListingError::InsufficientPermissions`] unless called by an admin
    /// - [`ListingError::NotFound`] if the listing does not exist
    /// - Infrastructure errors
    pub async fn admin_detail(&self, principal: &Principal, listing_id: ListingId) -> Result<AdminListingView> {
        match self.listing_detail(Viewer::admin(principal)?, listing_id).await? {
            ListingView::Admin(view) => Ok(view),
            _ => Err(ListingError::NotFound),
        }
    }

    /// Guest detail of an approved listing.
    ///
    /// # Errors
    ///
    /// - [`ListingError::NotFound`] unless the listing is approved
    /// - Infrastructure errors
    pub async fn public_detail(&self, listing_id: ListingId) -> Result<PublicListingView> {
        match self.listing_detail(Viewer::Public, listing_id).await? {
            ListingView::Public(view) => Ok(view),
            _ => Err(ListingError::NotFound),
        }
    }

    /// Active rooms of an approved listing.
    ///
    /// # Errors
    ///
    /// - [`ListingError::NotFound`] unless the listing is approved
    /// - Infrastructure errors
    pub async fn public_rooms(&self, listing_id: ListingId) -> Result<Vec<RoomView>> {
        self.cache
            .get_or_load(&CacheKey::PublicRooms(listing_id), self.config.detail_ttl, || async move {
                let aggregate = self
                    .store
                    .load_listing(listing_id)
                    .await?
                    .ok_or(ListingError::NotFound)?;
                projection::public_rooms(&aggregate).ok_or(ListingError::NotFound)
            })
            .await
    }

    fn page_for(&self, requested: Option<PageRequest>) -> PageRequest {
        requested
            .unwrap_or(PageRequest::new(1, self.config.default_page_size))
            .normalized(self.config.default_page_size, self.config.max_page_size)
    }

    /// The merchant's own listings, newest first.
    ///
    /// `query.owner` is replaced by the caller's id. Only the unfiltered
    /// first page is cached.
    ///
    /// # Errors
    ///
    /// - [`ListingError::InsufficientPermissions`] unless called by a merchant
    /// - Infrastructure errors
    pub async fn merchant_listings(&self, principal: &Principal, query: ListQuery) -> Result<Page<ListingSummary>> {
        require_role(principal, Role::Merchant)?;
        let query = ListQuery {
            owner: Some(principal.id),
            ..query
        };
        let page = self.page_for(query.page);
        let query = &query;

        let load = || async move {
            Ok::<_, ListingError>(
                self.store
                    .list_listings(query, page)
                    .await?
                    .map(ListingSummary::for_merchant),
            )
        };

        if query.is_default_view(self.config.default_page_size) {
            self.cache
                .get_or_load(&CacheKey::MerchantList(principal.id), self.config.list_ttl, load)
                .await
        } else {
            load().await
        }
    }

    /// All listings with owner names, newest first.
    ///
    /// Only the unfiltered first page is cached.
    ///
    /// # Errors
    ///
    /// - [`ListingError::InsufficientPermissions`] unless called by an admin
    /// - Infrastructure errors
    pub async fn admin_listings(&self, principal: &Principal, query: ListQuery) -> Result<Page<ListingSummary>> {
        require_role(principal, Role::Admin)?;
        let page = self.page_for(query.page);
        let query = &query;

        let load = || async move {
            Ok::<_, ListingError>(
                self.store
                    .list_listings(query, page)
                    .await?
                    .map(ListingSummary::for_admin),
            )
        };

        if query.owner.is_none() && query.is_default_view(self.config.default_page_size) {
            self.cache
                .get_or_load(&CacheKey::AdminList, self.config.list_ttl, load)
                .await
        } else {
            load().await
        }
    }

    /// Public search over approved listings. Never cached.
    ///
    /// # Errors
    ///
    /// - [`ListingError::Validation`] for malformed filters
    /// - Infrastructure errors
    #[tracing::instrument(skip(self, filters))]
    pub async fn search(&self, filters: &SearchFilters, page: Option<PageRequest>) -> Result<Page<SearchHit>> {
        let compiled = search::compile(filters, self.page_for(page))?;
        let results = self.store.search(&compiled).await?;
        tracing::debug!(
            predicates = compiled.predicates.len(),
            total = results.total,
            "Executed listing search"
        );
        Ok(results)
    }

    /// Featured approved listings for the homepage.
    ///
    /// # Errors
    ///
    /// Returns infrastructure errors from the listing store.
    pub async fn home_banners(&self) -> Result<Vec<Banner>> {
        self.cache
            .get_or_load(&CacheKey::HomeBanners, self.config.banner_ttl, || async move {
                let featured = self.store.featured_listings(self.config.banner_limit).await?;
                Ok::<_, ListingError>(featured.into_iter().map(Banner::from).collect())
            })
            .await
    }

    async fn stats_for(&self, key: CacheKey, owner: Option<UserId>) -> Result<StatsView> {
        self.cache
            .get_or_load(&key, self.config.stats_ttl, || async move {
                let statuses = self.store.status_counts(owner).await?;
                let regions = self.store.region_counts(owner).await?;
                Ok::<_, ListingError>(projection::stats_view(&statuses, regions))
            })
            .await
    }

    /// Region and status counts of the merchant's listings.
    ///
    /// # Errors
    ///
    /// - [`ListingError::InsufficientPermissions`] unless called by a merchant
    /// - Infrastructure errors
    pub async fn merchant_stats(&self, principal: &Principal) -> Result<StatsView> {
        require_role(principal, Role::Merchant)?;
        self.stats_for(CacheKey::MerchantStats(principal.id), Some(principal.id))
            .await
    }

    /// Region and status counts across all listings.
    ///
    /// # Errors
    ///
    /// - [`ListingError::InsufficientPermissions`] unless called by an admin
    /// - Infrastructure errors
    pub async fn admin_stats(&self, principal: &Principal) -> Result<StatsView> {
        require_role(principal, Role::Admin)?;
        self.stats_for(CacheKey::AdminStats, None).await
    }
}

/// How an admitted mutation ended.
enum Finished<T> {
    Committed(T),
    /// Nothing was written.
    Aborted(ListingError),
    /// The commit reported an error after the writes were sent.
    CommitFailed(ListingError),
}

/// Commit on success, roll back on failure.
async fn finish<Tx: ListingTransaction, T>(tx: Tx, result: Result<T>) -> Finished<T> {
    match result {
        Ok(value) => match tx.commit().await {
            Ok(()) => Finished::Committed(value),
            Err(e) => Finished::CommitFailed(e),
        },
        Err(e) => {
            if let Err(rollback_error) = tx.rollback().await {
                tracing::error!(error = %rollback_error, "Rollback failed");
            }
            Finished::Aborted(e)
        }
    }
}
