use async_graphql::{Enum, ID, InputObject, SimpleObject};
use chrono::{DateTime, Utc};
use products_crm::{
    AuthUser, Board, Deal, DealField, NewDeal, Screen, SessionGuard, SessionState, Stage,
};

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum DealStage {
    InboundDeals,
    InitialCall,
    DealReview,
    PartnerCall,
    Memo,
    Ic,
    Investment,
    Freezer,
    Dumpster,
}

impl From<Stage> for DealStage {
    fn from(value: Stage) -> Self {
        match value {
            Stage::Inbound => DealStage::InboundDeals,
            Stage::InitialCall => DealStage::InitialCall,
            Stage::DealReview => DealStage::DealReview,
            Stage::PartnerCall => DealStage::PartnerCall,
            Stage::Memo => DealStage::Memo,
            Stage::Ic => DealStage::Ic,
            Stage::Investment => DealStage::Investment,
            Stage::Freezer => DealStage::Freezer,
            Stage::Dumpster => DealStage::Dumpster,
        }
    }
}

impl From<DealStage> for Stage {
    fn from(value: DealStage) -> Self {
        match value {
            DealStage::InboundDeals => Stage::Inbound,
            DealStage::InitialCall => Stage::InitialCall,
            DealStage::DealReview => Stage::DealReview,
            DealStage::PartnerCall => Stage::PartnerCall,
            DealStage::Memo => Stage::Memo,
            DealStage::Ic => Stage::Ic,
            DealStage::Investment => Stage::Investment,
            DealStage::Freezer => Stage::Freezer,
            DealStage::Dumpster => Stage::Dumpster,
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum DealFieldName {
    Company,
    Stage,
    Partner,
    Sourcer,
    Notes,
    Description,
}

impl From<DealFieldName> for DealField {
    fn from(value: DealFieldName) -> Self {
        match value {
            DealFieldName::Company => DealField::Company,
            DealFieldName::Stage => DealField::Stage,
            DealFieldName::Partner => DealField::Partner,
            DealFieldName::Sourcer => DealField::Sourcer,
            DealFieldName::Notes => DealField::Notes,
            DealFieldName::Description => DealField::Description,
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
#[graphql(name = "Screen")]
pub enum ScreenNode {
    Loading,
    Login,
    Board,
}

impl From<Screen> for ScreenNode {
    fn from(value: Screen) -> Self {
        match value {
            Screen::Loading => ScreenNode::Loading,
            Screen::Login => ScreenNode::Login,
            Screen::Board => ScreenNode::Board,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Deal")]
pub struct DealNode {
    pub id: ID,
    pub company: String,
    pub stage: DealStage,
    pub stage_label: String,
    pub stage_color: String,
    pub sourcer: Option<String>,
    pub partner: Option<String>,
    pub notes: Option<String>,
    pub description: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl From<&Deal> for DealNode {
    fn from(deal: &Deal) -> Self {
        Self {
            id: ID::from(deal.id.to_string()),
            company: deal.company.clone(),
            stage: deal.stage.into(),
            stage_label: deal.stage.label().to_string(),
            stage_color: deal.stage.color().to_string(),
            sourcer: deal.sourcer.clone(),
            partner: deal.partner.clone(),
            notes: deal.notes.clone(),
            description: deal.description.clone(),
            last_updated: deal.last_updated,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "StageOption")]
pub struct StageNode {
    pub stage: DealStage,
    pub label: String,
    pub rank: i32,
    pub color: String,
    pub inactive: bool,
}

impl From<Stage> for StageNode {
    fn from(stage: Stage) -> Self {
        Self {
            stage: stage.into(),
            label: stage.label().to_string(),
            rank: i32::from(stage.rank()),
            color: stage.color().to_string(),
            inactive: stage.is_inactive(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct StageCount {
    pub stage: DealStage,
    pub count: i32,
    pub selected: bool,
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Board")]
pub struct BoardPayload {
    pub deals: Vec<DealNode>,
    pub filter: Vec<DealStage>,
    pub showing_all: bool,
    pub total: i32,
    pub counts: Vec<StageCount>,
    pub notice: Option<String>,
}

impl From<&Board> for BoardPayload {
    fn from(board: &Board) -> Self {
        let filter = board.filter();
        Self {
            deals: board.visible_deals().into_iter().map(DealNode::from).collect(),
            filter: filter.stages().into_iter().map(DealStage::from).collect(),
            showing_all: filter.is_unfiltered(),
            total: count(board.deals().len()),
            counts: board
                .stage_counts()
                .into_iter()
                .map(|(stage, n)| StageCount {
                    stage: stage.into(),
                    count: count(n),
                    selected: filter.contains(stage),
                })
                .collect(),
            notice: board.notice().map(str::to_string),
        }
    }
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "User")]
pub struct UserNode {
    pub id: ID,
    pub email: String,
}

impl From<AuthUser> for UserNode {
    fn from(user: AuthUser) -> Self {
        Self {
            id: ID::from(user.id.to_string()),
            email: user.email,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Session")]
pub struct SessionPayload {
    pub state: String,
    pub screen: ScreenNode,
    pub user: Option<UserNode>,
}

impl From<&SessionGuard> for SessionPayload {
    fn from(guard: &SessionGuard) -> Self {
        let state = guard.state();
        let user = match &state {
            SessionState::Authenticated(user) => Some(UserNode::from(user.clone())),
            _ => None,
        };
        Self {
            state: state.label().to_string(),
            screen: guard.screen().into(),
            user,
        }
    }
}

#[derive(Clone, Debug, InputObject)]
pub struct NewDealInput {
    pub company: String,
    pub stage: Option<DealStage>,
    pub sourcer: Option<String>,
    pub partner: Option<String>,
    pub notes: Option<String>,
    pub description: Option<String>,
}

impl From<NewDealInput> for NewDeal {
    fn from(input: NewDealInput) -> Self {
        NewDeal {
            company: input.company,
            stage: input.stage.map(Stage::from),
            sourcer: input.sourcer,
            partner: input.partner,
            notes: input.notes,
            description: input.description,
        }
    }
}
