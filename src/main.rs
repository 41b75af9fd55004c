use std::{process, sync::Arc};

use memwall::{
    application::{
        client::WallClient,
        error::{AppError, Notice},
    },
    cache::CacheConfig,
    config::{self, CliArgs, Command, Credentials},
    domain::validation::RegisterForm,
    infra::{
        http::{HttpProvider, TrackingNavigator},
        telemetry,
    },
};
use memwall_api_types::{
    CreateMemoryData, CreateWallData, InviteUserData, LoginData, UpdateMemoryData,
    UpdatePasswordData, UpdateWallData,
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        print_notice(&Notice::from(&error));
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging)?;

    let navigator = Arc::new(TrackingNavigator::default());
    let provider = HttpProvider::new(&settings.api, navigator)?;
    let client = WallClient::new(Arc::new(provider), CacheConfig::from(&settings.cache));

    let CliArgs {
        credentials,
        command,
        ..
    } = cli_args;

    client.check_session().await?;
    sign_in_if_requested(&client, credentials).await?;

    execute(&client, command).await
}

async fn sign_in_if_requested(client: &WallClient, credentials: Credentials) -> Result<(), AppError> {
    match (credentials.email, credentials.password) {
        (Some(email), Some(password)) => {
            let user = client.login(&LoginData { email, password }).await?;
            info!(user_id = %user.id, "Signed in");
            Ok(())
        }
        (None, None) => Ok(()),
        _ => Err(AppError::unexpected(
            "--email and --password must be given together",
        )),
    }
}

async fn execute(client: &WallClient, command: Command) -> Result<(), AppError> {
    match command {
        Command::Status => print_json(&client.session_status().await?),
        Command::Stats => print_json(&client.user_stats().await?),
        Command::Walls { shared: false } => print_json(&client.my_walls().await?),
        Command::Walls { shared: true } => print_json(&client.shared_walls().await?),
        Command::Wall { wall_id } => print_json(&client.wall(&wall_id).await?),
        Command::Members { wall_id } => print_json(&client.members(&wall_id).await?),
        Command::Memories { wall_id, page } => {
            print_json(&client.memories(&wall_id, page).await?)
        }
        Command::Memory { wall_id, memory_id } => {
            print_json(&client.memory(&wall_id, &memory_id).await?)
        }
        Command::CreateWall(fields) => {
            let data = CreateWallData {
                name: fields.name,
                description: fields.description,
                cover_image: fields.cover_image,
            };
            print_json(&client.create_wall(&data).await?)
        }
        Command::UpdateWall { wall_id, fields } => {
            let data = UpdateWallData {
                name: fields.name,
                description: fields.description,
                cover_image: fields.cover_image,
            };
            print_json(&client.update_wall(&wall_id, &data).await?)
        }
        Command::DeleteWall { wall_id } => {
            client.delete_wall(&wall_id).await?;
            print_done("wall deleted")
        }
        Command::Invite {
            wall_id,
            invitee_email,
            role,
        } => {
            let data = InviteUserData {
                email: invitee_email,
                role: role.into(),
            };
            client.invite_user(&wall_id, &data).await?;
            print_done("invitation sent")
        }
        Command::SetRole {
            wall_id,
            user_id,
            role,
        } => {
            client
                .update_member_role(&wall_id, &user_id, role.into())
                .await?;
            print_done("role updated")
        }
        Command::RemoveMember { wall_id, user_id } => {
            client.remove_member(&wall_id, &user_id).await?;
            print_done("member removed")
        }
        Command::CreateMemory { wall_id, fields } => {
            let data = CreateMemoryData {
                title: fields.title,
                content: fields.content,
                memory_date: fields.memory_date,
                assets: Vec::new(),
            };
            print_json(&client.create_memory(&wall_id, &data).await?)
        }
        Command::UpdateMemory {
            wall_id,
            memory_id,
            fields,
        } => {
            let data = UpdateMemoryData {
                title: fields.title,
                content: fields.content,
                memory_date: fields.memory_date,
                assets: None,
            };
            print_json(&client.update_memory(&wall_id, &memory_id, &data).await?)
        }
        Command::DeleteMemory { wall_id, memory_id } => {
            client.delete_memory(&wall_id, &memory_id).await?;
            print_done("memory deleted")
        }
        Command::Register(args) => {
            let form = RegisterForm {
                name: args.name,
                email: args.account_email,
                password: args.account_password,
                confirm_password: args.confirm_password,
            };
            print_json(&client.register(form).await?)
        }
        Command::ChangePassword {
            current_password,
            new_password,
        } => {
            let data = UpdatePasswordData {
                current_password,
                new_password,
            };
            client.change_password(&data).await?;
            print_done("password updated")
        }
        Command::Logout => {
            client.logout().await;
            print_done("signed out")
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{out}");
    Ok(())
}

fn print_done(message: &str) -> Result<(), AppError> {
    print_json(&serde_json::json!({ "success": true, "message": message }))
}

fn print_notice(notice: &Notice) {
    match serde_json::to_string_pretty(notice) {
        Ok(out) => println!("{out}"),
        Err(_) => println!("{notice}"),
    }
}
