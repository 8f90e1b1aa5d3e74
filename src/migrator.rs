use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_work_orders_table::Migration),
            Box::new(m20240301_000002_create_reports_table::Migration),
            Box::new(m20240301_000003_create_group_attendance_counts_table::Migration),
        ]
    }
}

mod m20240301_000001_create_work_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_work_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Mirrors entities::work_order Model
            manager
                .create_table(
                    Table::create()
                        .table(WorkOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WorkOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WorkOrders::OrderNo).string().not_null())
                        .col(
                            ColumnDef::new(WorkOrders::Status)
                                .string_len(32)
                                .not_null()
                                .default("pending_review"),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::Timestamp)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WorkOrders::ServiceDate).date().null())
                        .col(
                            ColumnDef::new(WorkOrders::EndTime)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(WorkOrders::DriverName).string().not_null())
                        .col(ColumnDef::new(WorkOrders::LocationName).string().not_null())
                        .col(ColumnDef::new(WorkOrders::DispatchStatus).string().null())
                        .col(ColumnDef::new(WorkOrders::Notes).text().null())
                        .col(ColumnDef::new(WorkOrders::QcNotes).text().null())
                        .col(ColumnDef::new(WorkOrders::ResolutionNotes).text().null())
                        .col(ColumnDef::new(WorkOrders::Duration).string().null())
                        .col(ColumnDef::new(WorkOrders::Lds).string().null())
                        .col(ColumnDef::new(WorkOrders::ApprovedUser).string().null())
                        .col(
                            ColumnDef::new(WorkOrders::ApprovedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(WorkOrders::FlaggedUser).string().null())
                        .col(
                            ColumnDef::new(WorkOrders::FlaggedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(WorkOrders::ResolvedUser).string().null())
                        .col(
                            ColumnDef::new(WorkOrders::ResolvedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(WorkOrders::RejectedUser).string().null())
                        .col(
                            ColumnDef::new(WorkOrders::RejectedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(WorkOrders::SearchResponse).json().not_null())
                        .col(ColumnDef::new(WorkOrders::CompletionResponse).json().null())
                        .col(
                            ColumnDef::new(WorkOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_work_orders_order_no")
                        .table(WorkOrders::Table)
                        .col(WorkOrders::OrderNo)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_work_orders_status")
                        .table(WorkOrders::Table)
                        .col(WorkOrders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_work_orders_service_date")
                        .table(WorkOrders::Table)
                        .col(WorkOrders::ServiceDate)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_work_orders_end_time")
                        .table(WorkOrders::Table)
                        .col(WorkOrders::EndTime)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WorkOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum WorkOrders {
        Table,
        Id,
        OrderNo,
        Status,
        Timestamp,
        ServiceDate,
        EndTime,
        DriverName,
        LocationName,
        DispatchStatus,
        Notes,
        QcNotes,
        ResolutionNotes,
        Duration,
        Lds,
        ApprovedUser,
        ApprovedAt,
        FlaggedUser,
        FlaggedAt,
        ResolvedUser,
        ResolvedAt,
        RejectedUser,
        RejectedAt,
        SearchResponse,
        CompletionResponse,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_reports_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_reports_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Reports::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Reports::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Reports::OrgId).string().not_null())
                        .col(ColumnDef::new(Reports::OrderNo).string().not_null())
                        .col(ColumnDef::new(Reports::Status).string().not_null())
                        .col(ColumnDef::new(Reports::DispatchStatus).string().null())
                        .col(ColumnDef::new(Reports::ScheduledTime).string().null())
                        .col(ColumnDef::new(Reports::EndTime).string().null())
                        .col(ColumnDef::new(Reports::CustName).string().null())
                        .col(ColumnDef::new(Reports::CustGroup).string().null())
                        .col(ColumnDef::new(Reports::TechName).string().null())
                        .col(ColumnDef::new(Reports::Region).string().null())
                        .col(ColumnDef::new(Reports::ReportDate).date().not_null())
                        .col(
                            ColumnDef::new(Reports::FetchedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Upsert target
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reports_order_no")
                        .table(Reports::Table)
                        .col(Reports::OrderNo)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reports_report_date")
                        .table(Reports::Table)
                        .col(Reports::ReportDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Reports::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Reports {
        Table,
        Id,
        OrgId,
        OrderNo,
        Status,
        DispatchStatus,
        ScheduledTime,
        EndTime,
        CustName,
        CustGroup,
        TechName,
        Region,
        ReportDate,
        FetchedAt,
    }
}

mod m20240301_000003_create_group_attendance_counts_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_group_attendance_counts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(GroupAttendanceCounts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(GroupAttendanceCounts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GroupAttendanceCounts::GroupId)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(GroupAttendanceCounts::Date).date().not_null())
                        .col(
                            ColumnDef::new(GroupAttendanceCounts::TotalCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(GroupAttendanceCounts::CompletedCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(GroupAttendanceCounts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_group_attendance_counts_group_date")
                        .table(GroupAttendanceCounts::Table)
                        .col(GroupAttendanceCounts::GroupId)
                        .col(GroupAttendanceCounts::Date)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(GroupAttendanceCounts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum GroupAttendanceCounts {
        Table,
        Id,
        GroupId,
        Date,
        TotalCount,
        CompletedCount,
        UpdatedAt,
    }
}
