//! Account operations, always scoped to the acting bank.
use super::ServiceResult;
use crate::app::AppState;
use crate::model::{Account, AccountPatch, Bank};
use crate::paging::{ACCOUNT_SORT_SAFELIST, Filters, Page};

/// Raw list parameters as a caller supplies them.
#[derive(Debug, Clone, Default)]
pub struct ListAccounts {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub sort: Option<String>,
}

pub async fn create_account(state: &AppState, bank: &Bank) -> ServiceResult<Account> {
    let account = state.store.insert_account(bank.id).await?;
    tracing::info!(bank_id = bank.id, account_id = account.id, "account created");
    Ok(account)
}

pub async fn get_account(state: &AppState, bank: &Bank, id: i64) -> ServiceResult<Account> {
    Ok(state.store.get_account(bank.id, id).await?)
}

/// Read, patch and write back under the version that was read.
pub async fn update_account(
    state: &AppState,
    bank: &Bank,
    id: i64,
    patch: AccountPatch,
) -> ServiceResult<Account> {
    let mut account = state.store.get_account(bank.id, id).await?;
    account.apply(&patch);
    let account = state.store.update_account(&account).await?;
    tracing::info!(
        bank_id = bank.id,
        account_id = account.id,
        version = account.version,
        "account updated"
    );
    Ok(account)
}

pub async fn delete_account(state: &AppState, bank: &Bank, id: i64) -> ServiceResult<()> {
    state.store.delete_account(bank.id, id).await?;
    tracing::info!(bank_id = bank.id, account_id = id, "account deleted");
    Ok(())
}

pub async fn list_accounts(
    state: &AppState,
    bank: &Bank,
    params: ListAccounts,
) -> ServiceResult<Page<Account>> {
    let filters = Filters::parse(
        params.page,
        params.page_size,
        params.sort.as_deref(),
        ACCOUNT_SORT_SAFELIST,
    )?;
    Ok(state.store.list_accounts(bank.id, &filters).await?)
}
