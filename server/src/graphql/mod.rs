mod types;

use std::sync::Arc;

use async_graphql::{Context, EmptySubscription, ID, Object, Schema};
use platform_api::{ApiError, internal_error, to_graphql};
use products_crm::{
    AuthUser, Board, DealId, FieldUpdate, SessionGuard, SessionState, Stage,
    StageFilter, TeamRoster,
};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{instrument, warn};

pub use types::{
    BoardPayload, DealFieldName, DealNode, DealStage, NewDealInput, ScreenNode, SessionPayload,
    StageNode,
};

pub type SchemaType = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub fn build_schema(app: Arc<AppContext>) -> SchemaType {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(app)
        .finish()
}

/// SDL of the schema, for `print-schema`.
pub fn sdl() -> String {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .finish()
        .sdl()
}

/// Board plus the user it was last loaded for.
pub struct BoardSlot {
    pub board: Board,
    loaded_for: Option<AuthUser>,
}

pub struct AppContext {
    session: SessionGuard,
    board: Mutex<BoardSlot>,
    team: TeamRoster,
}

impl AppContext {
    pub fn new(session: SessionGuard, board: Board, team: TeamRoster) -> Self {
        Self {
            session,
            board: Mutex::new(BoardSlot {
                board,
                loaded_for: None,
            }),
            team,
        }
    }

    pub fn session(&self) -> &SessionGuard {
        &self.session
    }

    pub fn into_session(self) -> SessionGuard {
        self.session
    }

    fn require_user(&self) -> Result<AuthUser, ApiError> {
        match self.session.state() {
            SessionState::Authenticated(user) => Ok(user),
            SessionState::Unknown => Err(ApiError::Loading),
            SessionState::Anonymous => Err(ApiError::Unauthenticated),
        }
    }

    /// The board for the signed-in user, loaded on first access.
    async fn board(&self) -> Result<MutexGuard<'_, BoardSlot>, ApiError> {
        let user = self.require_user()?;
        let mut slot = self.board.lock().await;
        if slot.loaded_for.as_ref() != Some(&user) {
            if let Err(err) = slot.board.refresh().await {
                warn!(error = %err, "initial board load failed");
            }
            slot.loaded_for = Some(user);
        }
        Ok(slot)
    }

    async fn forget_board(&self) {
        self.board.lock().await.loaded_for = None;
    }
}

fn app<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a Arc<AppContext>> {
    ctx.data::<Arc<AppContext>>()
        .map_err(|_| internal_error(anyhow::anyhow!("application context missing")))
}

fn parse_id(id: &ID) -> async_graphql::Result<DealId> {
    id.as_str().parse::<DealId>().map_err(to_graphql)
}

#[derive(Default)]
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    #[instrument(name = "graphql.session", skip_all)]
    async fn session(&self, ctx: &Context<'_>) -> async_graphql::Result<SessionPayload> {
        Ok(SessionPayload::from(app(ctx)?.session()))
    }

    async fn screen(&self, ctx: &Context<'_>) -> async_graphql::Result<ScreenNode> {
        Ok(app(ctx)?.session().screen().into())
    }

    /// Pipeline stages in board order.
    async fn stages(&self) -> Vec<StageNode> {
        Stage::ALL.into_iter().map(StageNode::from).collect()
    }

    /// Names offered for the partner and sourcer pickers.
    async fn team(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<String>> {
        Ok(app(ctx)?.team.members().to_vec())
    }

    #[instrument(name = "graphql.board", skip_all)]
    async fn board(&self, ctx: &Context<'_>) -> async_graphql::Result<BoardPayload> {
        let slot = app(ctx)?.board().await.map_err(to_graphql)?;
        Ok(BoardPayload::from(&slot.board))
    }
}

#[derive(Default)]
pub struct MutationRoot;

#[Object]
impl MutationRoot {
    #[instrument(name = "graphql.sign_in", skip_all)]
    async fn sign_in(
        &self,
        ctx: &Context<'_>,
        email: String,
        password: String,
    ) -> async_graphql::Result<SessionPayload> {
        let app = app(ctx)?;
        app.session()
            .sign_in(&email, &password)
            .await
            .map_err(to_graphql)?;
        Ok(SessionPayload::from(app.session()))
    }

    #[instrument(name = "graphql.sign_out", skip_all)]
    async fn sign_out(&self, ctx: &Context<'_>) -> async_graphql::Result<SessionPayload> {
        let app = app(ctx)?;
        let result = app.session().sign_out().await;
        app.forget_board().await;
        result.map_err(to_graphql)?;
        Ok(SessionPayload::from(app.session()))
    }

    #[instrument(name = "graphql.add_deal", skip_all)]
    async fn add_deal(
        &self,
        ctx: &Context<'_>,
        input: NewDealInput,
    ) -> async_graphql::Result<DealNode> {
        let mut slot = app(ctx)?.board().await.map_err(to_graphql)?;
        let deal = slot
            .board
            .add_deal(input.into())
            .await
            .map_err(to_graphql)?;
        Ok(DealNode::from(&deal))
    }

    /// Change one field. An absent or blank value clears optional fields.
    /// Null when the write landed but the deal could not be read back; see `board.notice`.
    #[instrument(name = "graphql.update_deal", skip_all)]
    async fn update_deal(
        &self,
        ctx: &Context<'_>,
        id: ID,
        field: DealFieldName,
        value: Option<String>,
    ) -> async_graphql::Result<Option<DealNode>> {
        let id = parse_id(&id)?;
        let update = FieldUpdate::parse(field.into(), value.as_deref()).map_err(to_graphql)?;
        let mut slot = app(ctx)?.board().await.map_err(to_graphql)?;
        let written = slot
            .board
            .update_field(id, update)
            .await
            .map_err(to_graphql)?;
        Ok(written.as_ref().map(DealNode::from))
    }

    /// Delete a deal. `confirm` must be true; nothing is sent otherwise.
    #[instrument(name = "graphql.delete_deal", skip_all)]
    async fn delete_deal(
        &self,
        ctx: &Context<'_>,
        id: ID,
        confirm: bool,
    ) -> async_graphql::Result<bool> {
        let id = parse_id(&id)?;
        if !confirm {
            return Err(to_graphql(ApiError::validation(
                "deletion must be confirmed",
            )));
        }
        let mut slot = app(ctx)?.board().await.map_err(to_graphql)?;
        let confirmation = slot.board.request_delete(id).map_err(to_graphql)?;
        slot.board
            .delete_deal(confirmation)
            .await
            .map_err(to_graphql)?;
        Ok(true)
    }

    async fn set_stage_filter(
        &self,
        ctx: &Context<'_>,
        stages: Vec<DealStage>,
    ) -> async_graphql::Result<BoardPayload> {
        let mut slot = app(ctx)?.board().await.map_err(to_graphql)?;
        slot.board
            .set_filter(StageFilter::only(stages.into_iter().map(Stage::from)));
        Ok(BoardPayload::from(&slot.board))
    }

    async fn toggle_stage(
        &self,
        ctx: &Context<'_>,
        stage: DealStage,
    ) -> async_graphql::Result<BoardPayload> {
        let mut slot = app(ctx)?.board().await.map_err(to_graphql)?;
        slot.board.toggle_stage(stage.into());
        Ok(BoardPayload::from(&slot.board))
    }

    async fn reset_stage_filter(&self, ctx: &Context<'_>) -> async_graphql::Result<BoardPayload> {
        let mut slot = app(ctx)?.board().await.map_err(to_graphql)?;
        slot.board.reset_filter();
        Ok(BoardPayload::from(&slot.board))
    }

    async fn show_all_stages(&self, ctx: &Context<'_>) -> async_graphql::Result<BoardPayload> {
        let mut slot = app(ctx)?.board().await.map_err(to_graphql)?;
        slot.board.show_all();
        Ok(BoardPayload::from(&slot.board))
    }

    #[instrument(name = "graphql.refresh_board", skip_all)]
    async fn refresh_board(&self, ctx: &Context<'_>) -> async_graphql::Result<BoardPayload> {
        let mut slot = app(ctx)?.board().await.map_err(to_graphql)?;
        slot.board.refresh().await.map_err(to_graphql)?;
        Ok(BoardPayload::from(&slot.board))
    }
}

#[cfg(test)]
mod tests {
    use async_graphql::{Request, Value, Variables};
    use products_crm::{
        DealRepository, SyncStrategy,
        memory::{InMemoryAuth, InMemoryDealStore},
    };
    use serde_json::json;

    use super::*;

    const EMAIL: &str = "partner@fund.vc";
    const PASSWORD: &str = "s3cret";

    async fn setup() -> (SchemaType, Arc<InMemoryDealStore>) {
        setup_with(SyncStrategy::Optimistic).await
    }

    async fn setup_with(strategy: SyncStrategy) -> (SchemaType, Arc<InMemoryDealStore>) {
        let auth = Arc::new(InMemoryAuth::new().with_account(EMAIL, PASSWORD));
        schema_for(SessionGuard::start(auth).await, strategy)
    }

    fn schema_for(
        session: SessionGuard,
        strategy: SyncStrategy,
    ) -> (SchemaType, Arc<InMemoryDealStore>) {
        let store = Arc::new(InMemoryDealStore::new());
        let board = Board::new(DealRepository::new(store.clone()), strategy);
        let app = Arc::new(AppContext::new(session, board, TeamRoster::default()));
        (build_schema(app), store)
    }

    async fn run(schema: &SchemaType, query: &str, vars: serde_json::Value) -> async_graphql::Response {
        schema
            .execute(Request::new(query).variables(Variables::from_json(vars)))
            .await
    }

    fn first_code(response: &async_graphql::Response) -> Option<Value> {
        response
            .errors
            .first()
            .and_then(|err| err.extensions.as_ref())
            .and_then(|ext| ext.get("code"))
            .cloned()
    }

    async fn sign_in(schema: &SchemaType) {
        let response = run(
            schema,
            "mutation($e: String!, $p: String!) { signIn(email: $e, password: $p) { screen } }",
            json!({"e": EMAIL, "p": PASSWORD}),
        )
        .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
    }

    fn companies(response: async_graphql::Response) -> Vec<String> {
        let body = response.data.into_json().unwrap();
        body["board"]["deals"]
            .as_array()
            .unwrap()
            .iter()
            .map(|deal| deal["company"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn board_requires_a_session() {
        let (schema, store) = setup().await;
        let screen = run(&schema, "{ screen }", json!({})).await;
        assert_eq!(screen.data.into_json().unwrap(), json!({"screen": "LOGIN"}));

        let response = run(&schema, "{ board { total } }", json!({})).await;
        assert_eq!(first_code(&response), Some(Value::from("UNAUTHENTICATED")));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn board_waits_for_the_session_check() {
        let auth = Arc::new(InMemoryAuth::new().with_account(EMAIL, PASSWORD));
        let (schema, store) = schema_for(SessionGuard::new(auth), SyncStrategy::Optimistic);

        let screen = run(&schema, "{ screen }", json!({})).await;
        assert_eq!(screen.data.into_json().unwrap(), json!({"screen": "LOADING"}));
        let response = run(&schema, "{ board { total } }", json!({})).await;
        assert_eq!(first_code(&response), Some(Value::from("LOADING")));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn update_that_lands_is_not_reported_missing_when_the_reread_fails() {
        let (schema, store) = setup_with(SyncStrategy::Refetch).await;
        sign_in(&schema).await;
        let added = run(
            &schema,
            "mutation { addDeal(input: {company: \"Acme\"}) { id } }",
            json!({}),
        )
        .await;
        let added = added.data.into_json().unwrap();
        let id = added["addDeal"]["id"].as_str().unwrap().to_string();
        store.set_reads_failing(true);

        let updated = run(
            &schema,
            "mutation($id: ID!) { updateDeal(id: $id, field: NOTES, value: \"hi\") { id notes } }",
            json!({"id": id}),
        )
        .await;
        assert!(updated.errors.is_empty(), "{:?}", updated.errors);
        assert_eq!(
            updated.data.into_json().unwrap(),
            json!({"updateDeal": {"id": id, "notes": "hi"}})
        );
        let stored = store.row(id.parse::<DealId>().unwrap()).unwrap();
        assert_eq!(stored.notes.as_deref(), Some("hi"));

        let board = run(&schema, "{ board { notice } }", json!({})).await;
        assert!(board.data.into_json().unwrap()["board"]["notice"].is_string());
    }

    #[tokio::test]
    async fn bad_credentials_report_auth_error() {
        let (schema, _) = setup().await;
        let response = run(
            &schema,
            "mutation { signIn(email: \"partner@fund.vc\", password: \"nope\") { state } }",
            json!({}),
        )
        .await;
        assert_eq!(first_code(&response), Some(Value::from("AUTH")));
        let session = run(&schema, "{ session { state screen } }", json!({})).await;
        assert_eq!(
            session.data.into_json().unwrap(),
            json!({"session": {"state": "anonymous", "screen": "LOGIN"}})
        );
    }

    #[tokio::test]
    async fn deal_lifecycle_through_the_schema() {
        let (schema, store) = setup().await;
        sign_in(&schema).await;

        let added = run(
            &schema,
            "mutation($input: NewDealInput!) { addDeal(input: $input) { id stage stageLabel } }",
            json!({"input": {"company": "Acme", "partner": " Seth "}}),
        )
        .await;
        assert!(added.errors.is_empty(), "{:?}", added.errors);
        let added = added.data.into_json().unwrap();
        assert_eq!(added["addDeal"]["stage"], "INBOUND_DEALS");
        assert_eq!(added["addDeal"]["stageLabel"], "Inbound Deals");
        let id = added["addDeal"]["id"].as_str().unwrap().to_string();

        let board = "{ board { deals { company } } }";
        assert_eq!(companies(run(&schema, board, json!({})).await), ["Acme"]);

        let moved = run(
            &schema,
            "mutation($id: ID!) { updateDeal(id: $id, field: STAGE, value: \"Dumpster\") { stage } }",
            json!({"id": id}),
        )
        .await;
        assert!(moved.errors.is_empty(), "{:?}", moved.errors);
        assert!(companies(run(&schema, board, json!({})).await).is_empty());

        let toggled = run(
            &schema,
            "mutation { toggleStage(stage: DUMPSTER) { deals { company } } }",
            json!({}),
        )
        .await;
        let toggled = toggled.data.into_json().unwrap();
        assert_eq!(toggled["toggleStage"]["deals"][0]["company"], "Acme");

        let unconfirmed = run(
            &schema,
            "mutation($id: ID!) { deleteDeal(id: $id, confirm: false) }",
            json!({"id": id}),
        )
        .await;
        assert_eq!(first_code(&unconfirmed), Some(Value::from("VALIDATION")));
        assert_eq!(store.len(), 1);

        let deleted = run(
            &schema,
            "mutation($id: ID!) { deleteDeal(id: $id, confirm: true) }",
            json!({"id": id}),
        )
        .await;
        assert_eq!(deleted.data.into_json().unwrap(), json!({"deleteDeal": true}));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn blank_company_is_a_validation_error() {
        let (schema, store) = setup().await;
        sign_in(&schema).await;
        let response = run(
            &schema,
            "mutation { addDeal(input: {company: \"   \"}) { id } }",
            json!({}),
        )
        .await;
        assert_eq!(first_code(&response), Some(Value::from("VALIDATION")));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn offline_store_surfaces_as_notice_and_transport_error() {
        let (schema, store) = setup().await;
        sign_in(&schema).await;
        store.set_offline(true);

        let board = run(&schema, "{ board { total notice } }", json!({})).await;
        let board = board.data.into_json().unwrap();
        assert_eq!(board["board"]["total"], 0);
        assert!(board["board"]["notice"].is_string());

        let refresh = run(&schema, "mutation { refreshBoard { total } }", json!({})).await;
        assert_eq!(first_code(&refresh), Some(Value::from("TRANSPORT")));
    }

    #[test]
    fn sdl_lists_the_board_operations() {
        let sdl = sdl();
        for name in ["signIn", "addDeal", "updateDeal", "deleteDeal", "toggleStage", "DUMPSTER"] {
            assert!(sdl.contains(name), "missing {name}");
        }
    }
}
