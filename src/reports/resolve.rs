//! Resolving transaction NFTs into CSV rows.

use crate::error::Result;
use crate::types::{CsvRecord, NOT_AVAILABLE, PENDING_TX, ReportId};
use crate::upstream::{ProjectTransaction, TransactionNft, decode_token_uid, extract_field_id};

use super::ReportService;

/// Completion percentage, rounded half up and capped at 100
///
/// An empty report counts as complete.
pub fn progress_percent(processed: u64, total: u64) -> u32 {
    if total == 0 {
        return 100;
    }
    let rounded = (processed.saturating_mul(200) + total) / (total * 2);
    rounded.min(100) as u32
}

/// NFT entries declared by a slice of transactions
pub(crate) fn nft_count(transactions: &[ProjectTransaction]) -> u64 {
    transactions.iter().map(|tx| tx.nfts.len() as u64).sum()
}

impl ReportService {
    /// One row per NFT entry, in listing order
    ///
    /// Lookups run concurrently, bounded by the rate-limited client. An NFT
    /// that cannot be resolved yields a sentinel row instead of failing the
    /// batch; every NFT of a failed transaction does so without a lookup.
    pub(crate) async fn resolve_batch(
        &self,
        report_id: ReportId,
        transactions: &[ProjectTransaction],
    ) -> Vec<CsvRecord> {
        let lookups = transactions
            .iter()
            .flat_map(|tx| tx.nfts.iter().map(move |nft| (tx, nft)))
            .map(|(tx, nft)| async move {
                if tx.is_failed() {
                    tracing::debug!(
                        report_id = %report_id,
                        transaction = tx.transaction_id.as_deref().unwrap_or_default(),
                        "Transaction failed upstream, writing sentinel row"
                    );
                    return CsvRecord::sentinel();
                }

                match self.resolve_nft(tx, nft).await {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::warn!(
                            report_id = %report_id,
                            nft_uid = %nft.nft_uid,
                            error = %e,
                            "NFT could not be resolved, writing sentinel row"
                        );
                        CsvRecord::sentinel()
                    }
                }
            });

        futures::future::join_all(lookups).await
    }

    async fn resolve_nft(&self, tx: &ProjectTransaction, nft: &TransactionNft) -> Result<CsvRecord> {
        let uid = decode_token_uid(&nft.nft_uid)?;
        let details = self.upstream.nft_details(&uid).await?;

        let field_id = extract_field_id(details.metadata.as_ref());
        let token_id = match details.uid.trim() {
            "" => uid,
            resolved => resolved.to_string(),
        };

        let mint_hash = details
            .initial_mint_tx_hash
            .as_deref()
            .map(str::trim)
            .filter(|hash| !hash.is_empty());

        let (tx_id, explorer_url) = match mint_hash {
            Some(hash) => {
                let chain = details
                    .minted_on_blockchain
                    .as_deref()
                    .or(tx.blockchain.as_deref());
                (
                    hash.to_string(),
                    self.explorer.transaction_url(chain, hash)?,
                )
            }
            None => (PENDING_TX.to_string(), NOT_AVAILABLE.to_string()),
        };

        Ok(CsvRecord {
            field_id,
            token_id,
            tx_id,
            explorer_url,
        })
    }
}
