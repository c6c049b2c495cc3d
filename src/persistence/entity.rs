//! SeaORM entity models backing `SeaOrmPersistenceSink`, one module per
//! table, in the usual `DeriveEntityModel` style.

pub mod turns {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "turns")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub match_id: Uuid,
        pub round: i64,
        pub player_user_id: String,
        pub flipped_indices: Json,
        pub matched: bool,
        pub turn_start_score_a: i32,
        pub turn_start_score_b: i32,
        pub score_a: i32,
        pub score_b: i32,
        pub at: ChronoDateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod arcana_uses {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "arcana_uses")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub match_id: Uuid,
        pub player_user_id: String,
        pub power_up_id: String,
        pub target_index: Option<i32>,
        pub no_effect: bool,
        pub at: ChronoDateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod match_arcana {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "match_arcana")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub match_id: Uuid,
        #[sea_orm(primary_key, auto_increment = false)]
        pub pair_id: i32,
        pub power_up_id: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod game_results {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "game_results")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub match_id: Uuid,
        pub user_id_a: String,
        pub user_id_b: String,
        pub score_a: i32,
        pub score_b: i32,
        pub winner_idx: Option<i16>,
        pub abandoned: bool,
        pub rating_a_before: Option<i32>,
        pub rating_a_after: Option<i32>,
        pub rating_b_before: Option<i32>,
        pub rating_b_after: Option<i32>,
        pub finished_at: ChronoDateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
